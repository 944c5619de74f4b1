//! Stabilization poller
//!
//! The engine never blocks. Each invocation polls a check exactly once; a
//! negative result becomes [`Progress::InProgress`] with the next backoff
//! delay, and the scheduler re-invokes after that delay. The start time
//! and poll count are kept in the context so the schedule and the deadline
//! survive suspension.

use crate::clock::Clock;
use crate::context::CallbackContext;
use crate::error::ProviderError;
use crate::types::{ErrorKind, Progress};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Delay and deadline for stabilization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first unsuccessful poll
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier applied per unsuccessful poll
    pub factor: f64,
    /// Give up once this much time has passed since the first poll
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Policy with a fixed delay between polls
    pub fn constant(delay: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            factor: 1.0,
            timeout,
        }
    }

    /// Delay to wait after the given unsuccessful poll (0-indexed)
    pub fn delay_for_poll(&self, poll: u32) -> Duration {
        let exponent = i32::try_from(poll).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

/// Why a stabilization check could not answer yes or no
#[derive(Debug, Error)]
pub enum StabilizeError {
    /// The resource is in a status it will never leave on its own
    #[error("resource is in terminal status '{status}'")]
    Terminal { status: String },

    /// Fetching the observed state failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Polls stabilization checks against a backoff policy
pub struct Poller<'c> {
    policy: BackoffPolicy,
    clock: &'c dyn Clock,
}

impl<'c> Poller<'c> {
    pub fn new(policy: BackoffPolicy, clock: &'c dyn Clock) -> Self {
        Self { policy, clock }
    }

    /// Same clock, different policy
    pub fn with_policy(&self, policy: BackoffPolicy) -> Poller<'c> {
        Poller {
            policy,
            clock: self.clock,
        }
    }

    /// Poll `check` once for the stabilization `name`
    ///
    /// Returns `Done` when the check passes, `InProgress` while it does not
    /// and the deadline has not passed, and `Failed(NotStabilized)` on
    /// timeout or terminal status. Provider errors are returned for the
    /// caller to classify.
    pub fn poll<F>(
        &self,
        ctx: &mut CallbackContext,
        name: &str,
        check: F,
    ) -> Result<Progress, ProviderError>
    where
        F: FnOnce(&mut CallbackContext) -> Result<bool, StabilizeError>,
    {
        let key = format!("{name}.stabilize");
        let now = self.clock.now();
        let started = ctx.timestamp_once(&key, now);

        match check(ctx) {
            Ok(true) => {
                log::debug!("{name}: stabilized");
                Ok(Progress::Done)
            }
            Ok(false) => {
                let elapsed = (now - started).to_std().unwrap_or_default();
                if elapsed > self.policy.timeout {
                    log::warn!(
                        "{name}: not stabilized after {}s (timeout {}s)",
                        elapsed.as_secs(),
                        self.policy.timeout.as_secs()
                    );
                    return Ok(Progress::failed(
                        ErrorKind::NotStabilized,
                        format!(
                            "{name} did not stabilize within {}s",
                            self.policy.timeout.as_secs()
                        ),
                    ));
                }

                let poll = ctx.next_poll(&key);
                let retry_after = self.policy.delay_for_poll(poll);
                log::debug!(
                    "{name}: not stable yet (poll {}), retry in {}s",
                    poll + 1,
                    retry_after.as_secs()
                );
                Ok(Progress::in_progress(retry_after))
            }
            Err(StabilizeError::Terminal { status }) => {
                log::warn!("{name}: resource reached terminal status {status}");
                Ok(Progress::failed(
                    ErrorKind::NotStabilized,
                    format!("{name}: resource is in terminal status '{status}'"),
                ))
            }
            Err(StabilizeError::Provider(err)) => Err(err),
        }
    }
}
