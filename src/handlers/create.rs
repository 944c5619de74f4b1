//! Create: provision the instance, then settle what creation could not
//!
//! Restored instances and read replicas ignore most settings at creation,
//! so those variants are followed by a modify. Tags that had to be dropped
//! from the create call are applied afterwards, then roles are attached.

use super::update;
use super::{HandlerEvent, HandlerRequest, Handlers};
use crate::model::{DbInstance, ObservedInstance, Tag};
use crate::provider::{ApiResult, DbApi};
use crate::tagging::{self, TaggingContext};
use crate::{roles, rules, stabilize, translate};
use reconcile::{
    CallbackContext, ErrorKind, Operation, Pipeline, Poller, Progress, Step, StrategyTable,
};

pub(super) const CREATE_STEP: &str = "create-db-instance";

/// Provider call used to bring the instance into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateVariant {
    Restore,
    ReadReplica,
    Plain,
}

fn variants() -> StrategyTable<DbInstance, CreateVariant> {
    StrategyTable::new()
        .when(DbInstance::is_restore, CreateVariant::Restore)
        .when(DbInstance::is_read_replica, CreateVariant::ReadReplica)
        .otherwise(CreateVariant::Plain)
}

fn create_step<'s, Req>(
    api: &'s dyn DbApi,
    request: Req,
    invoke: impl Fn(&Req) -> ApiResult<ObservedInstance> + 's,
    threshold: u32,
) -> Step<'s, DbInstance, Req, ObservedInstance>
where
    Req: Clone + 's,
{
    Step::new(CREATE_STEP, move |_: &DbInstance| request.clone(), invoke)
        .stabilize(move |_, _, model: &DbInstance, ctx| {
            stabilize::instance_stabilized(api, &model.identifier, threshold, ctx)
        })
        .rules(&rules::CREATE)
}

/// One attempt at the create call of `variant`, carrying `tags`
fn evaluate_create(
    api: &dyn DbApi,
    variant: CreateVariant,
    model: &DbInstance,
    tags: &[Tag],
    threshold: u32,
    ctx: &mut CallbackContext,
    poller: &Poller<'_>,
) -> Progress {
    match variant {
        CreateVariant::Plain => {
            let request = translate::create_request(model, tags);
            create_step(api, request, move |r| api.create_db_instance(r), threshold)
                .evaluate(model, ctx, poller)
        }
        CreateVariant::Restore => {
            let Some(request) = translate::restore_request(model, tags) else {
                return Progress::failed(
                    ErrorKind::InvalidRequest,
                    "restore requires a snapshot identifier",
                );
            };
            create_step(
                api,
                request,
                move |r| api.restore_db_instance_from_snapshot(r),
                threshold,
            )
            .evaluate(model, ctx, poller)
        }
        CreateVariant::ReadReplica => {
            let Some(request) = translate::read_replica_request(model, tags) else {
                return Progress::failed(
                    ErrorKind::InvalidRequest,
                    "read replica requires a source identifier",
                );
            };
            create_step(
                api,
                request,
                move |r| api.create_db_instance_read_replica(r),
                threshold,
            )
            .evaluate(model, ctx, poller)
        }
    }
}

pub(super) fn handle(h: &Handlers<'_>, request: HandlerRequest) -> HandlerEvent {
    let tags = request.desired_tags();
    let variant = variants()
        .select(&request.desired)
        .copied()
        .unwrap_or(CreateVariant::Plain);
    log::debug!("create {}: {variant:?} variant", request.desired.identifier);

    let api = h.client_for(&request.desired);
    let threshold = h.probe_threshold();
    let soft_fail = h.config().soft_fail_tags.enabled;
    let poller = h.poller();

    let pipeline = Pipeline::new(Operation::Create)
        .stage("create", |model: &DbInstance, ctx, poller| {
            tagging::create_with_tag_fallback(ctx, CREATE_STEP, &tags, soft_fail, |tags, ctx| {
                evaluate_create(api, variant, model, tags, threshold, ctx, poller)
            })
        })
        .stage("modify-after-create", |model, ctx, poller| {
            if variant == CreateVariant::Plain {
                return Progress::Done;
            }
            update::modify_step(api, threshold).evaluate(model, ctx, poller)
        })
        .stage("tags", |model, ctx, poller| {
            let tagging = match TaggingContext::load(ctx) {
                Ok(tagging) => tagging,
                Err(progress) => return progress,
            };
            if !tagging.soft_fail_tags {
                return Progress::Done;
            }
            tagging::update_tags(
                h.api,
                &model.identifier,
                &tags.system_only(),
                &tags,
                true,
                ctx,
                poller,
            )
        })
        .stage("roles", |model, ctx, poller| {
            roles::reconcile_roles(
                h.api,
                &model.identifier,
                &[],
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
