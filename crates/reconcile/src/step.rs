//! Step - one unit of work: translate, invoke, stabilize, classify
//!
//! A step performs at most one mutating call per attempt. When it has a
//! stabilization phase, the step records "invoked" (and the response) in
//! the context right after the call succeeds; a re-invocation while the
//! step is still stabilizing only polls again.

use crate::context::CallbackContext;
use crate::error::ProviderError;
use crate::poller::{Poller, StabilizeError};
use crate::rules::ErrorRuleSet;
use crate::types::{ErrorKind, Progress};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Whether the step `name` has issued its call and is now stabilizing
pub fn is_invoked(ctx: &CallbackContext, name: &str) -> bool {
    ctx.is_set(&invoked_key(name))
}

fn invoked_key(name: &str) -> String {
    format!("{name}.invoked")
}

type TranslateFn<'a, M, Req> = Box<dyn Fn(&M) -> Req + 'a>;
type InvokeFn<'a, Req, Resp> = Box<dyn Fn(&Req) -> Result<Resp, ProviderError> + 'a>;
type StabilizeFn<'a, M, Req, Resp> =
    Box<dyn Fn(&Req, &Resp, &M, &mut CallbackContext) -> Result<bool, StabilizeError> + 'a>;
type HandleErrorFn<'a, M> = Box<dyn Fn(&ProviderError, &M, &mut CallbackContext) -> Progress + 'a>;

/// A single provider call with optional stabilization
///
/// # Example
///
/// ```ignore
/// let step = Step::new(
///     "modify-db-instance",
///     |model: &DbInstance| translate::modify_request(model),
///     |request| api.modify_db_instance(request),
/// )
/// .stabilize(|_, _, model, ctx| stabilize::instance_stabilized(api, &model.identifier, ctx))
/// .rules(&rules::UPDATE);
///
/// let progress = step.evaluate(&model, &mut ctx, &poller);
/// ```
pub struct Step<'a, M, Req, Resp> {
    name: String,
    translate: TranslateFn<'a, M, Req>,
    invoke: InvokeFn<'a, Req, Resp>,
    stabilize: Option<StabilizeFn<'a, M, Req, Resp>>,
    handle_error: Option<HandleErrorFn<'a, M>>,
    rules: Arc<ErrorRuleSet>,
}

impl<'a, M, Req, Resp> Step<'a, M, Req, Resp>
where
    Resp: Serialize + DeserializeOwned,
{
    pub fn new(
        name: impl Into<String>,
        translate: impl Fn(&M) -> Req + 'a,
        invoke: impl Fn(&Req) -> Result<Resp, ProviderError> + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            translate: Box::new(translate),
            invoke: Box::new(invoke),
            stabilize: None,
            handle_error: None,
            rules: ErrorRuleSet::empty(),
        }
    }

    /// Do not report success until `check` passes
    pub fn stabilize(
        mut self,
        check: impl Fn(&Req, &Resp, &M, &mut CallbackContext) -> Result<bool, StabilizeError> + 'a,
    ) -> Self {
        self.stabilize = Some(Box::new(check));
        self
    }

    /// Classify errors with `rules`
    pub fn rules(mut self, rules: &Arc<ErrorRuleSet>) -> Self {
        self.rules = Arc::clone(rules);
        self
    }

    /// Replace rule-based classification with a custom handler
    pub fn handle_error(
        mut self,
        handler: impl Fn(&ProviderError, &M, &mut CallbackContext) -> Progress + 'a,
    ) -> Self {
        self.handle_error = Some(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn response_key(&self) -> String {
        format!("{}.response", self.name)
    }

    fn on_error(&self, err: &ProviderError, model: &M, ctx: &mut CallbackContext) -> Progress {
        let progress = match &self.handle_error {
            Some(handler) => handler(err, model, ctx),
            None => self.rules.classify(err).into_progress(err),
        };
        match &progress {
            Progress::Done => log::info!("{}: absorbed '{err}'", self.name),
            Progress::Failed { kind, .. } => log::warn!("{}: {kind}: {err}", self.name),
            Progress::InProgress { .. } => {}
        }
        progress
    }

    /// Response from an earlier invocation that issued the call
    fn recorded_response(&self, ctx: &CallbackContext) -> Result<Resp, Progress> {
        match ctx.sub_context::<Resp>(&self.response_key()) {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(Progress::failed(
                ErrorKind::InternalFailure,
                format!("{}: invoked but no response recorded", self.name),
            )),
            Err(err) => Err(Progress::failed(ErrorKind::InternalFailure, err.to_string())),
        }
    }

    /// Evaluate the step once against `model`
    pub fn evaluate(&self, model: &M, ctx: &mut CallbackContext, poller: &Poller<'_>) -> Progress {
        let request = (self.translate)(model);

        let Some(stabilize) = &self.stabilize else {
            log::debug!("{}: invoking", self.name);
            return match (self.invoke)(&request) {
                Ok(_) => Progress::Done,
                Err(err) => self.on_error(&err, model, ctx),
            };
        };

        let response = if is_invoked(ctx, &self.name) {
            match self.recorded_response(ctx) {
                Ok(response) => response,
                Err(progress) => return progress,
            }
        } else {
            log::debug!("{}: invoking", self.name);
            let response = match (self.invoke)(&request) {
                Ok(response) => response,
                // An absorbed error means the effect is already in place
                Err(err) => return self.on_error(&err, model, ctx),
            };
            if let Err(err) = ctx.put_sub_context(&self.response_key(), &response) {
                return Progress::failed(ErrorKind::InternalFailure, err.to_string());
            }
            ctx.set(&invoked_key(&self.name));
            response
        };

        match poller.poll(ctx, &self.name, |ctx| {
            stabilize(&request, &response, model, ctx)
        }) {
            Ok(progress) => progress,
            Err(err) => self.on_error(&err, model, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::poller::BackoffPolicy;
    use crate::rules::Action;
    use std::cell::Cell;
    use std::time::Duration;

    fn poller(clock: &ManualClock) -> Poller<'_> {
        Poller::new(
            BackoffPolicy::constant(Duration::from_secs(5), Duration::from_secs(60)),
            clock,
        )
    }

    #[test]
    fn test_plain_step_invokes_and_completes() {
        let clock = ManualClock::default();
        let calls = Cell::new(0);
        let step = Step::new(
            "add-tags",
            |model: &String| model.clone(),
            |_req: &String| {
                calls.set(calls.get() + 1);
                Ok(())
            },
        );

        let mut ctx = CallbackContext::new();
        let progress = step.evaluate(&"db1".to_string(), &mut ctx, &poller(&clock));

        assert!(progress.is_done());
        assert_eq!(calls.get(), 1);
        assert!(!ctx.is_set("add-tags.invoked"));
    }

    #[test]
    fn test_stabilizing_step_invokes_once_across_polls() {
        let clock = ManualClock::default();
        let invokes = Cell::new(0);
        let polls = Cell::new(0);
        let step = Step::new(
            "create",
            |model: &String| model.clone(),
            |req: &String| {
                invokes.set(invokes.get() + 1);
                Ok(format!("arn:{req}"))
            },
        )
        .stabilize(|_req, resp: &String, _model, _ctx| {
            assert_eq!(resp, "arn:db1");
            polls.set(polls.get() + 1);
            Ok(polls.get() >= 3)
        });

        let mut ctx = CallbackContext::new();
        let model = "db1".to_string();

        for _ in 0..2 {
            let progress = step.evaluate(&model, &mut ctx, &poller(&clock));
            assert_eq!(progress, Progress::in_progress(Duration::from_secs(5)));
        }
        let progress = step.evaluate(&model, &mut ctx, &poller(&clock));

        assert!(progress.is_done());
        assert_eq!(invokes.get(), 1);
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_ignored_error_skips_stabilization() {
        let clock = ManualClock::default();
        let rules = ErrorRuleSet::builder()
            .with_error_codes(Action::Ignore, &["DBInstanceRoleAlreadyExists"])
            .build();
        let step = Step::new(
            "add-role",
            |_: &()| (),
            |_: &()| -> Result<(), ProviderError> {
                Err(ProviderError::service("DBInstanceRoleAlreadyExists", "attached"))
            },
        )
        .stabilize(|_, _, _, _| panic!("must not stabilize"))
        .rules(&rules);

        let mut ctx = CallbackContext::new();
        assert!(step.evaluate(&(), &mut ctx, &poller(&clock)).is_done());
    }

    #[test]
    fn test_unclassified_error_is_internal_failure() {
        let clock = ManualClock::default();
        let step = Step::new(
            "create",
            |_: &()| (),
            |_: &()| -> Result<(), ProviderError> {
                Err(ProviderError::service("Weird", "unexpected"))
            },
        );

        let mut ctx = CallbackContext::new();
        let progress = step.evaluate(&(), &mut ctx, &poller(&clock));
        assert_eq!(progress.error_kind(), Some(ErrorKind::InternalFailure));
    }

    #[test]
    fn test_custom_error_handler_replaces_rules() {
        let clock = ManualClock::default();
        let step = Step::new(
            "delete",
            |_: &()| (),
            |_: &()| -> Result<(), ProviderError> {
                Err(ProviderError::service("DBInstanceNotFound", "gone"))
            },
        )
        .handle_error(|err, _, ctx| {
            ctx.set("saw-not-found");
            if err.has_code("DBInstanceNotFound") {
                Progress::Done
            } else {
                Progress::failed(ErrorKind::InternalFailure, err.to_string())
            }
        });

        let mut ctx = CallbackContext::new();
        assert!(step.evaluate(&(), &mut ctx, &poller(&clock)).is_done());
        assert!(ctx.is_set("saw-not-found"));
    }

    #[test]
    fn test_stabilization_errors_are_classified() {
        let clock = ManualClock::default();
        let rules = ErrorRuleSet::builder()
            .with_error_codes(Action::FailWith(ErrorKind::NotFound), &["DBInstanceNotFound"])
            .build();
        let step = Step::new("modify", |_: &()| (), |_: &()| Ok(()))
            .stabilize(|_, _, _, _| {
                Err(ProviderError::service("DBInstanceNotFound", "vanished").into())
            })
            .rules(&rules);

        let mut ctx = CallbackContext::new();
        let progress = step.evaluate(&(), &mut ctx, &poller(&clock));
        assert_eq!(progress.error_kind(), Some(ErrorKind::NotFound));
        assert!(is_invoked(&ctx, "modify"));
    }
}
