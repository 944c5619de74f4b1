//! # Reconcile
//!
//! A resumable reconciliation engine for remote resources.
//!
//! A handler is invoked repeatedly by an external scheduler. Each invocation
//! receives the desired model and the context returned by the previous one,
//! advances the work as far as it can without blocking, and returns either a
//! terminal result or an "in progress" event with a re-invoke delay. The
//! engine never sleeps.
//!
//! ## Core Concepts
//!
//! - **CallbackContext**: Serializable progress markers carried between invocations
//! - **Step**: One provider call: translate, invoke, stabilize, classify errors
//! - **ErrorRuleSet**: Ordered rules mapping provider errors to outcomes
//! - **Poller**: Stabilization with backoff and a deadline
//! - **Pipeline**: Fixed, ordered stages per operation, each run at most once
//! - **Set reconciler**: Diff-and-apply for add/remove sub-resources
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{CallbackContext, Operation, Pipeline, Poller, Step, SystemClock};
//!
//! let clock = SystemClock;
//! let poller = Poller::new(BackoffPolicy::default(), &clock);
//!
//! let pipeline = Pipeline::new(Operation::Create)
//!     .step(
//!         Step::new("create", translate::create_request, |req| api.create(req))
//!             .stabilize(|_, _, model, ctx| stabilized(api, model, ctx))
//!             .rules(&CREATE_RULES),
//!     )
//!     .stage("roles", |model, ctx, poller| reconcile_roles(model, ctx, poller));
//!
//! let event = pipeline.run(model, context, &poller, |model, _| read(api, model));
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod probe;
pub mod rules;
pub mod set;
pub mod step;
pub mod strategy;
pub mod tracker;
pub mod types;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CallbackContext;
pub use error::{Error, ErrorCategory, ProviderError, Result};
pub use pipeline::Pipeline;
pub use poller::{BackoffPolicy, Poller, StabilizeError};
pub use rules::{Action, Disposition, ErrorRuleSet, ErrorRuleSetBuilder, Matcher, classify};
pub use set::{SetDiff, SetMember};
pub use step::Step;
pub use strategy::StrategyTable;
pub use types::{ErrorKind, Operation, Progress, ProgressEvent};
