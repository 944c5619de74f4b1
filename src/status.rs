//! Instance status values the handlers act on

use crate::model::ObservedInstance;
use reconcile::StabilizeError;

pub const AVAILABLE: &str = "available";
pub const DELETING: &str = "deleting";
pub const IN_SYNC: &str = "in-sync";
pub const PENDING_REBOOT: &str = "pending-reboot";
pub const ROLE_ACTIVE: &str = "ACTIVE";

/// Statuses from which an instance never becomes available on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Failed,
    IncompatibleCredentials,
    IncompatibleNetwork,
    IncompatibleOptionGroup,
    IncompatibleParameters,
    IncompatibleRestore,
    InaccessibleEncryptionCredentials,
    RestoreError,
}

impl TerminalStatus {
    pub const ALL: [Self; 8] = [
        Self::Failed,
        Self::IncompatibleCredentials,
        Self::IncompatibleNetwork,
        Self::IncompatibleOptionGroup,
        Self::IncompatibleParameters,
        Self::IncompatibleRestore,
        Self::InaccessibleEncryptionCredentials,
        Self::RestoreError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::IncompatibleCredentials => "incompatible-credentials",
            Self::IncompatibleNetwork => "incompatible-network",
            Self::IncompatibleOptionGroup => "incompatible-option-group",
            Self::IncompatibleParameters => "incompatible-parameters",
            Self::IncompatibleRestore => "incompatible-restore",
            Self::InaccessibleEncryptionCredentials => "inaccessible-encryption-credentials",
            Self::RestoreError => "restore-error",
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == status)
    }
}

pub fn is_terminal(status: &str) -> bool {
    TerminalStatus::parse(status).is_some()
}

/// Fail stabilization immediately when the instance is in a terminal status
pub fn assert_not_terminal(observed: &ObservedInstance) -> Result<(), StabilizeError> {
    if is_terminal(&observed.status) {
        return Err(StabilizeError::Terminal {
            status: observed.status.clone(),
        });
    }
    Ok(())
}
