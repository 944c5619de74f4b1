//! Desired and observed database instance models

use reconcile::SetMember;
use serde::{Deserialize, Serialize};

/// A single resource tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl SetMember for Tag {
    fn identity(&self) -> String {
        self.key.clone()
    }

    // A changed value is a removal of the old pair plus an addition of the new one
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// An IAM role associated with the instance for one feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbRole {
    pub role_arn: String,
    pub feature_name: String,
}

impl DbRole {
    pub fn new(role_arn: impl Into<String>, feature_name: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            feature_name: feature_name.into(),
        }
    }
}

impl SetMember for DbRole {
    fn identity(&self) -> String {
        format!("{}|{}", self.role_arn, self.feature_name)
    }
}

/// What happens to the data when the instance is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    #[default]
    Delete,
    Snapshot,
}

/// Desired state of a database instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbInstance {
    pub identifier: String,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage: Option<u32>,
    pub db_parameter_group: Option<String>,
    pub option_group: Option<String>,
    /// Legacy (EC2-Classic) security groups; only the legacy client accepts them
    pub db_security_groups: Vec<String>,
    /// Restore from this snapshot instead of creating an empty instance
    pub snapshot_identifier: Option<String>,
    /// Create a read replica of this instance
    pub source_identifier: Option<String>,
    pub associated_roles: Vec<DbRole>,
    pub tags: Vec<Tag>,
    pub deletion_policy: DeletionPolicy,
}

impl DbInstance {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn is_restore(&self) -> bool {
        self.snapshot_identifier.is_some()
    }

    pub fn is_read_replica(&self) -> bool {
        self.source_identifier.is_some()
    }

    pub fn uses_legacy_security_groups(&self) -> bool {
        !self.db_security_groups.is_empty()
    }
}

/// Name and apply status of a parameter or option group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub name: String,
    pub status: String,
}

impl GroupMembership {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// A role association as reported by describe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRole {
    pub role_arn: String,
    pub feature_name: String,
    pub status: String,
}

impl ObservedRole {
    pub fn matches(&self, role: &DbRole) -> bool {
        self.role_arn == role.role_arn && self.feature_name == role.feature_name
    }
}

/// Instance state as last fetched from the provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservedInstance {
    pub identifier: String,
    pub status: String,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage: Option<u32>,
    pub pending_modifications: bool,
    pub parameter_groups: Vec<GroupMembership>,
    pub option_groups: Vec<GroupMembership>,
    pub associated_roles: Vec<ObservedRole>,
    pub tags: Vec<Tag>,
    pub endpoint: Option<String>,
}

impl ObservedInstance {
    pub fn role(&self, role: &DbRole) -> Option<&ObservedRole> {
        self.associated_roles.iter().find(|r| r.matches(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::set;

    #[test]
    fn test_tag_value_change_is_replace() {
        let previous = [Tag::new("env", "dev"), Tag::new("team", "db")];
        let desired = [Tag::new("env", "prod"), Tag::new("team", "db")];

        let diff = set::diff(&previous, &desired);
        assert_eq!(diff.to_remove, vec![&Tag::new("env", "dev")]);
        assert_eq!(diff.to_add, vec![&Tag::new("env", "prod")]);
    }

    #[test]
    fn test_role_identity_includes_feature() {
        let s3 = DbRole::new("arn:aws:iam::1:role/r", "s3Import");
        let lambda = DbRole::new("arn:aws:iam::1:role/r", "Lambda");
        assert_ne!(s3.identity(), lambda.identity());
        assert!(!s3.same_as(&lambda));
    }

    #[test]
    fn test_desired_model_from_toml() {
        let model: DbInstance = toml::from_str(
            r#"
identifier = "db1"
engine = "postgres"
deletion_policy = "snapshot"
tags = [{ key = "env", value = "prod" }]
"#,
        )
        .unwrap();

        assert_eq!(model.identifier, "db1");
        assert_eq!(model.deletion_policy, DeletionPolicy::Snapshot);
        assert_eq!(model.tags, vec![Tag::new("env", "prod")]);
        assert!(!model.is_restore());
        assert!(!model.uses_legacy_security_groups());
    }
}
