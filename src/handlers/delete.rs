//! Delete: issue the delete, then wait for the instance to disappear

use super::{HandlerEvent, HandlerRequest, Handlers};
use crate::model::DbInstance;
use crate::{rules, stabilize, translate};
use reconcile::{Operation, Pipeline, Step};

const DELETE_STEP: &str = "delete-db-instance";
const AWAIT_DELETION: &str = "await-deletion";

pub(super) fn handle(h: &Handlers<'_>, request: HandlerRequest) -> HandlerEvent {
    let api = h.api;
    let delete_policy = h.config().delete_policy();
    let poller = h.poller();

    let pipeline = Pipeline::new(Operation::Delete)
        .step(
            Step::new(DELETE_STEP, translate::delete_request, move |request| {
                api.delete_db_instance(request)
            })
            .rules(&rules::DELETE),
        )
        .stage(AWAIT_DELETION, move |model: &DbInstance, ctx, poller| {
            poller
                .with_policy(delete_policy.clone())
                .poll(ctx, AWAIT_DELETION, |_| {
                    stabilize::instance_deleted(api, &model.identifier)
                })
                .unwrap_or_else(|err| rules::DELETE.classify(&err).into_progress(&err))
        })
        .rules(&rules::DEFAULT);

    pipeline.run(request.desired, request.context, &poller, |_, _| Ok(None))
}
