//! Read: describe the instance, nothing to reconcile

use super::{HandlerEvent, HandlerRequest, Handlers};
use crate::model::DbInstance;
use crate::rules;
use reconcile::{Operation, Pipeline};

pub(super) fn handle(h: &Handlers<'_>, request: HandlerRequest) -> HandlerEvent {
    let poller = h.poller();
    Pipeline::new(Operation::Read).rules(&rules::DEFAULT).run(
        request.desired,
        request.context,
        &poller,
        |model: &DbInstance, _| h.read_output(&model.identifier),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;
    use crate::handlers::HandlerOutput;
    use crate::model::ObservedInstance;
    use crate::sim::SimulatedDb;
    use crate::status::AVAILABLE;
    use reconcile::{ErrorKind, ManualClock, ProgressEvent};

    #[test]
    fn test_read_returns_observed_instance() {
        let db = SimulatedDb::new();
        db.seed(ObservedInstance {
            identifier: "db1".to_string(),
            status: AVAILABLE.to_string(),
            ..ObservedInstance::default()
        });
        let clock = ManualClock::default();
        let handlers = Handlers::new(&db, HandlerConfig::default(), &clock);

        let event = handlers.handle(Operation::Read, HandlerRequest::new(DbInstance::new("db1")));

        match event {
            ProgressEvent::Success {
                observed: Some(HandlerOutput::Instance(observed)),
            } => assert_eq!(observed.identifier, "db1"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(db.calls("describe_db_instance"), 1);
    }

    #[test]
    fn test_read_missing_instance_is_not_found() {
        let db = SimulatedDb::new();
        let clock = ManualClock::default();
        let handlers = Handlers::new(&db, HandlerConfig::default(), &clock);

        let event = handlers.handle(Operation::Read, HandlerRequest::new(DbInstance::new("db1")));
        assert_eq!(event.error_kind(), Some(ErrorKind::NotFound));
    }
}
