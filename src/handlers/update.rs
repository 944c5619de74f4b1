//! Update: modify, reboot if a parameter group needs it, tags, roles

use super::{HandlerEvent, HandlerRequest, Handlers};
use crate::model::{DbInstance, ObservedInstance};
use crate::provider::{DbApi, ModifyInstanceRequest, RebootRequest};
use crate::{roles, rules, stabilize, tagging, translate};
use reconcile::{CallbackContext, Operation, Pipeline, Poller, Progress, Step, step};

pub(super) const MODIFY_STEP: &str = "modify-db-instance";
const REBOOT_STEP: &str = "reboot-db-instance";

/// Modify the instance and wait until it is stable again
pub(super) fn modify_step(
    api: &dyn DbApi,
    threshold: u32,
) -> Step<'_, DbInstance, ModifyInstanceRequest, ObservedInstance> {
    Step::new(MODIFY_STEP, translate::modify_request, move |request| {
        api.modify_db_instance(request)
    })
    .stabilize(move |_, _, model: &DbInstance, ctx| {
        stabilize::instance_stabilized(api, &model.identifier, threshold, ctx)
    })
    .rules(&rules::UPDATE)
}

fn reboot_step(
    api: &dyn DbApi,
    threshold: u32,
) -> Step<'_, DbInstance, RebootRequest, ObservedInstance> {
    Step::new(REBOOT_STEP, translate::reboot_request, move |request| {
        api.reboot_db_instance(request)
    })
    .stabilize(move |_, _, model: &DbInstance, ctx| {
        stabilize::instance_stabilized(api, &model.identifier, threshold, ctx)
    })
    .rules(&rules::UPDATE)
}

/// Reboot when a parameter group reports `pending-reboot`
///
/// Once the reboot is issued, later invocations only wait for it.
fn reboot_if_pending(
    api: &dyn DbApi,
    model: &DbInstance,
    threshold: u32,
    ctx: &mut CallbackContext,
    poller: &Poller<'_>,
) -> Progress {
    if !step::is_invoked(ctx, REBOOT_STEP) {
        match api.describe_db_instance(&model.identifier) {
            Ok(observed) if !stabilize::needs_reboot(&observed) => return Progress::Done,
            Ok(_) => log::info!("{}: parameter group pending reboot", model.identifier),
            Err(err) => return rules::UPDATE.classify(&err).into_progress(&err),
        }
    }
    reboot_step(api, threshold).evaluate(model, ctx, poller)
}

pub(super) fn handle(h: &Handlers<'_>, request: HandlerRequest) -> HandlerEvent {
    let desired_tags = request.desired_tags();
    let previous_tags = request.previous_tags();
    let previous_roles = request
        .previous
        .as_ref()
        .map(|p| p.associated_roles.clone())
        .unwrap_or_default();
    let parameter_group_changed = request
        .previous
        .as_ref()
        .is_none_or(|p| p.db_parameter_group != request.desired.db_parameter_group);

    let api = h.client_for(&request.desired);
    let threshold = h.probe_threshold();
    let soft_fail = h.config().soft_fail_tags.enabled;
    let poller = h.poller();

    let pipeline = Pipeline::new(Operation::Update)
        .step(modify_step(api, threshold))
        .stage("reboot", |model: &DbInstance, ctx, poller| {
            if !parameter_group_changed && !step::is_invoked(ctx, REBOOT_STEP) {
                return Progress::Done;
            }
            reboot_if_pending(h.api, model, threshold, ctx, poller)
        })
        .stage("tags", |model, ctx, poller| {
            tagging::update_tags(
                h.api,
                &model.identifier,
                &previous_tags,
                &desired_tags,
                soft_fail,
                ctx,
                poller,
            )
        })
        .stage("roles", |model, ctx, poller| {
            roles::reconcile_roles(
                h.api,
                &model.identifier,
                &previous_roles,
                &model.associated_roles,
                ctx,
                poller,
            )
        })
        .rules(&rules::DEFAULT);

    pipeline.run(request.desired, request.context, &poller, |model, _| {
        h.read_output(&model.identifier)
    })
}
