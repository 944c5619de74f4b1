//! Database-instance reconciliation on top of the `reconcile` engine
//!
//! [`handlers::Handlers`] implements Create, Read, Update, Delete and List
//! for a database instance against any [`provider::DbApi`]. Each invocation
//! returns a [`handlers::HandlerEvent`]; an in-progress event carries the
//! context to pass to the next invocation, which [`host::Host`] does until
//! the operation is terminal. [`sim::SimulatedDb`] stands in for the control
//! plane in tests and scenario replays.

pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod model;
pub mod provider;
pub mod roles;
pub mod rules;
pub mod scenario;
pub mod sim;
pub mod stabilize;
pub mod status;
pub mod tagging;
pub mod translate;

pub use error::{Error, Result};
