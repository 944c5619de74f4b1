//! Errors raised while driving handlers and loading scenarios.

use reconcile::Operation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The handler was still in progress when the invocation budget ran out
    #[error("{operation} still in progress after {limit} invocations")]
    InvocationLimit { operation: Operation, limit: usize },

    /// A scenario asks for something the simulator cannot do
    #[error("invalid scenario: {0}")]
    Scenario(String),
}

pub type Result<T> = std::result::Result<T, Error>;
