//! Stabilization predicates over freshly described instances
//!
//! Every predicate performs one describe call and checks the terminal
//! statuses first.

use crate::model::{DbRole, ObservedInstance};
use crate::provider::DbApi;
use crate::rules::codes;
use crate::status::{self, AVAILABLE, IN_SYNC, PENDING_REBOOT, ROLE_ACTIVE};
use reconcile::{CallbackContext, StabilizeError, probe};

/// Describe `identifier`, failing fast on a terminal status
pub fn describe_checked(
    api: &dyn DbApi,
    identifier: &str,
) -> Result<ObservedInstance, StabilizeError> {
    let observed = api.describe_db_instance(identifier)?;
    status::assert_not_terminal(&observed)?;
    Ok(observed)
}

/// Available, nothing pending, groups applied and roles active
///
/// A parameter group waiting for a reboot counts as applied; the reboot
/// is a separate step.
pub fn is_settled(observed: &ObservedInstance) -> bool {
    observed.status == AVAILABLE
        && !observed.pending_modifications
        && observed
            .parameter_groups
            .iter()
            .all(|g| g.status == IN_SYNC || g.status == PENDING_REBOOT)
        && observed.option_groups.iter().all(|g| g.status == IN_SYNC)
        && observed
            .associated_roles
            .iter()
            .all(|r| r.status == ROLE_ACTIVE)
}

/// Whether a parameter group change is waiting for a reboot
pub fn needs_reboot(observed: &ObservedInstance) -> bool {
    observed
        .parameter_groups
        .iter()
        .any(|g| g.status == PENDING_REBOOT)
}

/// Instance is settled for `threshold` consecutive checks
///
/// A freshly modified instance may still report `available` before the
/// modification shows up, so one positive observation is not enough.
pub fn instance_stabilized(
    api: &dyn DbApi,
    identifier: &str,
    threshold: u32,
    ctx: &mut CallbackContext,
) -> Result<bool, StabilizeError> {
    let probe_name = format!("{identifier}.stabilized");
    probe::with_probing(ctx, &probe_name, threshold, || {
        describe_checked(api, identifier).map(|observed| is_settled(&observed))
    })
}

/// Instance is gone; any other describe error is passed through
pub fn instance_deleted(api: &dyn DbApi, identifier: &str) -> Result<bool, StabilizeError> {
    match api.describe_db_instance(identifier) {
        Ok(observed) => {
            status::assert_not_terminal(&observed)?;
            Ok(false)
        }
        Err(err) if err.has_code(codes::DB_INSTANCE_NOT_FOUND) => Ok(true),
        Err(err) => Err(err.into()),
    }
}

pub fn role_attached(
    api: &dyn DbApi,
    identifier: &str,
    role: &DbRole,
) -> Result<bool, StabilizeError> {
    let observed = describe_checked(api, identifier)?;
    Ok(observed.role(role).is_some_and(|r| r.status == ROLE_ACTIVE))
}

pub fn role_detached(
    api: &dyn DbApi,
    identifier: &str,
    role: &DbRole,
) -> Result<bool, StabilizeError> {
    let observed = describe_checked(api, identifier)?;
    Ok(observed.role(role).is_none())
}
