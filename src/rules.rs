//! Error rule tables for database instance operations
//!
//! Every operation-specific table extends [`DEFAULT`] with only the rules
//! it overrides.

use reconcile::{Action, ErrorCategory, ErrorKind, ErrorRuleSet, ProviderError};
use regex::Regex;
use std::sync::{Arc, LazyLock};

pub mod codes {
    pub const THROTTLING: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];
    pub const ACCESS_DENIED: &[&str] = &[
        "AccessDenied",
        "AccessDeniedException",
        "NotAuthorized",
        "UnauthorizedOperation",
        "KMSKeyNotAccessibleFault",
    ];
    pub const NOT_FOUND: &[&str] = &[
        DB_INSTANCE_NOT_FOUND,
        "DBParameterGroupNotFound",
        "DBSecurityGroupNotFound",
        "DBSnapshotNotFound",
        "DBSubnetGroupNotFoundFault",
        "OptionGroupNotFoundFault",
    ];
    pub const CONFLICT: &[&str] = &[
        INVALID_DB_INSTANCE_STATE,
        "InvalidDBSecurityGroupState",
        "InvalidDBSnapshotState",
        "InvalidVPCNetworkStateFault",
        "DBUpgradeDependencyFailure",
    ];
    pub const LIMIT_EXCEEDED: &[&str] = &[
        "InstanceQuotaExceeded",
        "StorageQuotaExceeded",
        "DBInstanceRoleQuotaExceeded",
        "SnapshotQuotaExceeded",
    ];
    pub const INVALID_REQUEST: &[&str] = &[
        INVALID_PARAMETER_COMBINATION,
        "InvalidParameterValue",
        "StorageTypeNotSupported",
        "InsufficientDBInstanceCapacity",
    ];

    pub const DB_INSTANCE_NOT_FOUND: &str = "DBInstanceNotFound";
    pub const DB_INSTANCE_ALREADY_EXISTS: &str = "DBInstanceAlreadyExists";
    pub const INVALID_DB_INSTANCE_STATE: &str = "InvalidDBInstanceState";
    pub const INVALID_PARAMETER_COMBINATION: &str = "InvalidParameterCombination";
    pub const ROLE_ALREADY_EXISTS: &str = "DBInstanceRoleAlreadyExists";
    pub const ROLE_NOT_FOUND: &str = "DBInstanceRoleNotFound";
}

static RATE_EXCEEDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brate exceeded\b").expect("valid regex"));

static ALREADY_DELETING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)is already being deleted").expect("valid regex"));

static NO_MODIFICATIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)no modifications were requested").expect("valid regex"));

/// Shared table every operation falls back to
pub static DEFAULT: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::builder()
        .with_error_codes(Action::FailWith(ErrorKind::Throttling), codes::THROTTLING)
        .with_error_codes(Action::FailWith(ErrorKind::AccessDenied), codes::ACCESS_DENIED)
        .with_error_codes(Action::FailWith(ErrorKind::NotFound), codes::NOT_FOUND)
        .with_error_codes(Action::FailWith(ErrorKind::ResourceConflict), codes::CONFLICT)
        .with_error_codes(
            Action::FailWith(ErrorKind::ServiceLimitExceeded),
            codes::LIMIT_EXCEEDED,
        )
        .with_error_codes(
            Action::FailWith(ErrorKind::InvalidRequest),
            codes::INVALID_REQUEST,
        )
        .with_categories(
            Action::FailWith(ErrorKind::Throttling),
            &[ErrorCategory::Throttling],
        )
        .with_message(
            Action::FailWith(ErrorKind::Throttling),
            RATE_EXCEEDED.clone(),
        )
        .build()
});

pub static CREATE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(
            Action::FailWith(ErrorKind::AlreadyExists),
            &[codes::DB_INSTANCE_ALREADY_EXISTS],
        )
        .build()
});

fn no_modifications(err: &ProviderError) -> Action {
    if NO_MODIFICATIONS.is_match(&err.message) {
        Action::Ignore
    } else {
        Action::FailWith(ErrorKind::InvalidRequest)
    }
}

pub static UPDATE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(
            Action::Conditional(no_modifications),
            &[codes::INVALID_PARAMETER_COMBINATION],
        )
        .build()
});

fn already_deleting(err: &ProviderError) -> Action {
    if ALREADY_DELETING.is_match(&err.message) {
        Action::Ignore
    } else {
        Action::FailWith(ErrorKind::ResourceConflict)
    }
}

pub static DELETE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(
            Action::Conditional(already_deleting),
            &[codes::INVALID_DB_INSTANCE_STATE],
        )
        .build()
});

pub static ADD_ROLE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(Action::Ignore, &[codes::ROLE_ALREADY_EXISTS])
        .build()
});

pub static REMOVE_ROLE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(Action::Ignore, &[codes::ROLE_NOT_FOUND])
        .build()
});

/// Tag changes allowed to be skipped when the caller lacks tagging permissions
///
/// Tag changes that must succeed use [`DEFAULT`].
pub static SOFT_FAIL_TAG: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
    ErrorRuleSet::extend(&DEFAULT)
        .with_error_codes(Action::Ignore, codes::ACCESS_DENIED)
        .build()
});

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::Disposition;

    #[test]
    fn test_default_table() {
        let cases = [
            ("ThrottlingException", ErrorKind::Throttling),
            ("NotAuthorized", ErrorKind::AccessDenied),
            ("DBInstanceNotFound", ErrorKind::NotFound),
            ("InvalidDBInstanceState", ErrorKind::ResourceConflict),
            ("InstanceQuotaExceeded", ErrorKind::ServiceLimitExceeded),
            ("InvalidParameterValue", ErrorKind::InvalidRequest),
            ("SomethingNew", ErrorKind::InternalFailure),
        ];
        for (code, kind) in cases {
            let err = ProviderError::service(code, "message");
            assert_eq!(DEFAULT.classify(&err), Disposition::FailWith(kind), "{code}");
        }
    }

    #[test]
    fn test_rate_exceeded_message_is_throttling() {
        let err = ProviderError::categorized(ErrorCategory::Unknown, "Rate exceeded");
        assert_eq!(
            DEFAULT.classify(&err),
            Disposition::FailWith(ErrorKind::Throttling)
        );
    }

    #[test]
    fn test_create_maps_already_exists() {
        let err = ProviderError::service(codes::DB_INSTANCE_ALREADY_EXISTS, "db1 exists");
        assert_eq!(
            CREATE.classify(&err),
            Disposition::FailWith(ErrorKind::AlreadyExists)
        );
        assert_eq!(
            DEFAULT.classify(&err),
            Disposition::FailWith(ErrorKind::InternalFailure)
        );
    }

    #[test]
    fn test_delete_absorbs_already_deleting_only() {
        let deleting = ProviderError::service(
            codes::INVALID_DB_INSTANCE_STATE,
            "Instance db1 is already being deleted.",
        );
        let modifying = ProviderError::service(
            codes::INVALID_DB_INSTANCE_STATE,
            "Instance db1 is currently modifying.",
        );
        assert_eq!(DELETE.classify(&deleting), Disposition::Ignore);
        assert_eq!(
            DELETE.classify(&modifying),
            Disposition::FailWith(ErrorKind::ResourceConflict)
        );
    }

    #[test]
    fn test_update_ignores_empty_modification() {
        let err = ProviderError::service(
            codes::INVALID_PARAMETER_COMBINATION,
            "No modifications were requested",
        );
        assert_eq!(UPDATE.classify(&err), Disposition::Ignore);
    }

    #[test]
    fn test_role_tables_absorb_races() {
        let exists = ProviderError::service(codes::ROLE_ALREADY_EXISTS, "attached");
        let missing = ProviderError::service(codes::ROLE_NOT_FOUND, "detached");
        assert_eq!(ADD_ROLE.classify(&exists), Disposition::Ignore);
        assert_eq!(REMOVE_ROLE.classify(&missing), Disposition::Ignore);
        assert_eq!(
            ADD_ROLE.classify(&missing),
            Disposition::FailWith(ErrorKind::InternalFailure)
        );
    }

    #[test]
    fn test_soft_fail_tags_ignore_access_denied() {
        let err = ProviderError::service("AccessDenied", "not allowed to tag");
        assert_eq!(
            DEFAULT.classify(&err),
            Disposition::FailWith(ErrorKind::AccessDenied)
        );
        assert_eq!(SOFT_FAIL_TAG.classify(&err), Disposition::Ignore);

        let throttled = ProviderError::service("ThrottlingException", "slow down");
        assert_eq!(
            SOFT_FAIL_TAG.classify(&throttled),
            Disposition::FailWith(ErrorKind::Throttling)
        );
    }
}
