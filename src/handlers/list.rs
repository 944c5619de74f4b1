//! List: one page of instances per invocation

use super::{HandlerEvent, HandlerOutput, HandlerRequest, Handlers};
use crate::model::DbInstance;
use crate::rules;
use reconcile::{Operation, Pipeline};

pub(super) fn handle(h: &Handlers<'_>, request: HandlerRequest) -> HandlerEvent {
    let HandlerRequest {
        desired,
        context,
        next_token,
        ..
    } = request;
    let poller = h.poller();

    Pipeline::new(Operation::List).rules(&rules::DEFAULT).run(
        desired,
        context,
        &poller,
        |_: &DbInstance, _| {
            h.api
                .list_db_instances(next_token.as_deref())
                .map(|page| Some(HandlerOutput::Page(page)))
        },
    )
}
