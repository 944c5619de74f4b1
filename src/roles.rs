//! Role association reconciliation
//!
//! Each association is added or removed by its own step, which then waits
//! until describe shows the role active (or gone).

use crate::model::DbRole;
use crate::provider::DbApi;
use crate::rules;
use crate::stabilize;
use crate::translate;
use reconcile::{CallbackContext, Poller, Progress, Step, set};

pub const ROLES: &str = "roles";

pub fn reconcile_roles(
    api: &dyn DbApi,
    identifier: &str,
    previous: &[DbRole],
    desired: &[DbRole],
    ctx: &mut CallbackContext,
    poller: &Poller<'_>,
) -> Progress {
    set::reconcile(
        ctx,
        ROLES,
        previous,
        desired,
        |role, ctx| {
            Step::new(
                set::item_key(ROLES, "remove", role),
                |role: &DbRole| translate::role_request(identifier, role),
                |request| api.remove_role_from_db_instance(request),
            )
            .stabilize(|_, _, role, _| stabilize::role_detached(api, identifier, role))
            .rules(&rules::REMOVE_ROLE)
            .evaluate(role, ctx, poller)
        },
        |role, ctx| {
            Step::new(
                set::item_key(ROLES, "add", role),
                |role: &DbRole| translate::role_request(identifier, role),
                |request| api.add_role_to_db_instance(request),
            )
            .stabilize(|_, _, role, _| stabilize::role_attached(api, identifier, role))
            .rules(&rules::ADD_ROLE)
            .evaluate(role, ctx, poller)
        },
    )
}
