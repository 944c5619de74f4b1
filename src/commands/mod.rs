// Scenario replay
pub mod simulate;

// Inspection
pub mod config;
pub mod context;
