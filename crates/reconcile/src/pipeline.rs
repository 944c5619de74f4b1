//! Reconciliation orchestrator - a fixed, ordered list of stages per operation
//!
//! Every stage runs under the idempotency tracker. The first stage that
//! does not complete stops the pipeline: a failure is returned unchanged,
//! and an in-progress stage tells the scheduler to re-invoke later with the
//! returned context. There is no rollback.

use crate::context::CallbackContext;
use crate::error::ProviderError;
use crate::poller::Poller;
use crate::rules::{Disposition, ErrorRuleSet};
use crate::step::Step;
use crate::tracker;
use crate::types::{Operation, Progress, ProgressEvent};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

type StageFn<'a, M> = Box<dyn Fn(&M, &mut CallbackContext, &Poller<'_>) -> Progress + 'a>;

struct Stage<'a, M> {
    name: String,
    run: StageFn<'a, M>,
}

/// Statically composed pipeline for one operation
pub struct Pipeline<'a, M> {
    operation: Operation,
    stages: Vec<Stage<'a, M>>,
    rules: Arc<ErrorRuleSet>,
}

impl<'a, M> Pipeline<'a, M> {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            stages: Vec::new(),
            rules: ErrorRuleSet::empty(),
        }
    }

    /// Append a step; its name is its completion flag
    pub fn step<Req, Resp>(self, step: Step<'a, M, Req, Resp>) -> Self
    where
        M: 'a,
        Req: 'a,
        Resp: Serialize + DeserializeOwned + 'a,
    {
        let name = step.name().to_string();
        self.stage(name, move |model, ctx, poller| {
            step.evaluate(model, ctx, poller)
        })
    }

    /// Append an arbitrary stage, e.g. a set reconciliation
    pub fn stage(
        mut self,
        name: impl Into<String>,
        run: impl Fn(&M, &mut CallbackContext, &Poller<'_>) -> Progress + 'a,
    ) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            run: Box::new(run),
        });
        self
    }

    /// Rules used to classify errors from the final read
    pub fn rules(mut self, rules: &Arc<ErrorRuleSet>) -> Self {
        self.rules = Arc::clone(rules);
        self
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run the stages in order, stopping at the first one that does not complete
    pub fn execute(&self, model: &M, ctx: &mut CallbackContext, poller: &Poller<'_>) -> Progress {
        for stage in &self.stages {
            let progress = tracker::run_once(ctx, &stage.name, |ctx| {
                log::debug!("{} {}: running", self.operation, stage.name);
                (stage.run)(model, ctx, poller)
            });

            match &progress {
                Progress::Done => continue,
                Progress::InProgress { retry_after } => {
                    log::info!(
                        "{} {}: in progress, re-invoke in {}s",
                        self.operation,
                        stage.name,
                        retry_after.as_secs()
                    );
                }
                Progress::Failed { kind, message } => {
                    log::warn!("{} {}: failed ({kind}): {message}", self.operation, stage.name);
                }
            }
            return progress;
        }
        Progress::Done
    }

    /// Run the pipeline and, once every stage is complete, produce the result
    ///
    /// `finish` typically re-reads the resource; its errors are classified
    /// with the pipeline rules, an ignored error yielding an empty success.
    pub fn run<O, F>(
        &self,
        model: M,
        mut ctx: CallbackContext,
        poller: &Poller<'_>,
        finish: F,
    ) -> ProgressEvent<M, O>
    where
        F: FnOnce(&M, &mut CallbackContext) -> Result<Option<O>, ProviderError>,
    {
        let progress = self.execute(&model, &mut ctx, poller);
        if !progress.is_done() {
            return ProgressEvent::from_progress(progress, model, ctx);
        }

        match finish(&model, &mut ctx) {
            Ok(observed) => {
                log::info!("{}: complete", self.operation);
                ProgressEvent::Success { observed }
            }
            Err(err) => match self.rules.classify(&err) {
                Disposition::Ignore => ProgressEvent::Success { observed: None },
                Disposition::FailWith(kind) => ProgressEvent::Failed {
                    model,
                    context: ctx,
                    kind,
                    message: err.to_string(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::poller::BackoffPolicy;
    use crate::rules::Action;
    use crate::types::ErrorKind;
    use std::cell::Cell;
    use std::time::Duration;

    fn poller(clock: &ManualClock) -> Poller<'_> {
        Poller::new(
            BackoffPolicy::constant(Duration::from_secs(5), Duration::from_secs(60)),
            clock,
        )
    }

    #[test]
    fn test_failed_stage_stops_pipeline() {
        let clock = ManualClock::default();
        let later_invokes = Cell::new(0);
        let already_exists = ErrorRuleSet::builder()
            .with_error_codes(
                Action::FailWith(ErrorKind::AlreadyExists),
                &["AlreadyExists"],
            )
            .build();

        let pipeline = Pipeline::new(Operation::Create)
            .step(
                Step::new(
                    "create",
                    |_: &()| (),
                    |_: &()| -> Result<(), ProviderError> {
                        Err(ProviderError::service("AlreadyExists", "taken"))
                    },
                )
                .rules(&already_exists),
            )
            .step(Step::new("tags", |_: &()| (), |_: &()| {
                later_invokes.set(later_invokes.get() + 1);
                Ok(())
            }))
            .step(Step::new("roles", |_: &()| (), |_: &()| {
                later_invokes.set(later_invokes.get() + 1);
                Ok(())
            }));

        let event: ProgressEvent<(), ()> =
            pipeline.run((), CallbackContext::new(), &poller(&clock), |_, _| Ok(None));

        assert_eq!(event.error_kind(), Some(ErrorKind::AlreadyExists));
        assert_eq!(later_invokes.get(), 0);
    }

    #[test]
    fn test_reinvocation_skips_completed_steps() {
        let clock = ManualClock::default();
        let create_invokes = Cell::new(0);
        let ready = Cell::new(false);

        let pipeline = Pipeline::new(Operation::Create)
            .step(
                Step::new("create", |_: &()| (), |_: &()| {
                    create_invokes.set(create_invokes.get() + 1);
                    Ok(())
                })
                .stabilize(|_, _, _, _| Ok(ready.get())),
            )
            .stage("roles", |_, _, _| Progress::Done);

        let first: ProgressEvent<(), ()> =
            pipeline.run((), CallbackContext::new(), &poller(&clock), |_, _| Ok(None));
        let context = match first {
            ProgressEvent::InProgress { context, .. } => context,
            other => panic!("expected in progress, got {other:?}"),
        };

        ready.set(true);
        let second: ProgressEvent<(), ()> =
            pipeline.run((), context.clone(), &poller(&clock), |_, _| Ok(None));
        assert!(second.is_success());

        // A third run with a fully completed context does nothing
        let mut done = context;
        done.set("create");
        done.set("roles");
        let third: ProgressEvent<(), ()> =
            pipeline.run((), done, &poller(&clock), |_, _| Ok(None));
        assert!(third.is_success());
        assert_eq!(create_invokes.get(), 1);
    }

    #[test]
    fn test_stage_order_is_declared_order() {
        let clock = ManualClock::default();
        let order = std::cell::RefCell::new(Vec::new());
        let pipeline = Pipeline::new(Operation::Update)
            .stage("modify", |_: &(), _, _| {
                order.borrow_mut().push("modify");
                Progress::Done
            })
            .stage("reboot", |_, _, _| {
                order.borrow_mut().push("reboot");
                Progress::Done
            })
            .stage("tags", |_, _, _| {
                order.borrow_mut().push("tags");
                Progress::Done
            });

        assert_eq!(pipeline.stage_names(), vec!["modify", "reboot", "tags"]);
        let mut ctx = CallbackContext::new();
        assert!(pipeline.execute(&(), &mut ctx, &poller(&clock)).is_done());
        assert_eq!(*order.borrow(), vec!["modify", "reboot", "tags"]);
    }

    #[test]
    fn test_finish_errors_are_classified() {
        let clock = ManualClock::default();
        let rules = ErrorRuleSet::builder()
            .with_error_codes(Action::FailWith(ErrorKind::NotFound), &["DBInstanceNotFound"])
            .build();
        let pipeline: Pipeline<'_, ()> = Pipeline::new(Operation::Read).rules(&rules);

        let event: ProgressEvent<(), String> =
            pipeline.run((), CallbackContext::new(), &poller(&clock), |_, _| {
                Err(ProviderError::service("DBInstanceNotFound", "db1"))
            });

        assert_eq!(event.error_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_finish_result_is_returned() {
        let clock = ManualClock::default();
        let pipeline: Pipeline<'_, ()> = Pipeline::new(Operation::Read);

        let event = pipeline.run((), CallbackContext::new(), &poller(&clock), |_, _| {
            Ok(Some("available".to_string()))
        });

        assert_eq!(
            event,
            ProgressEvent::Success {
                observed: Some("available".to_string())
            }
        );
    }
}
