//! Idempotency tracker - per-step completion bookkeeping
//!
//! A step that already completed in an earlier invocation of the same
//! logical operation is skipped and assumed successful.

use crate::context::CallbackContext;
use crate::types::Progress;

/// Run `step` unless the flag `name` is already set
///
/// The flag is set only when `step` returns [`Progress::Done`]. An
/// in-progress or failed step leaves it unset so a later invocation
/// runs `step` again.
pub fn run_once<F>(ctx: &mut CallbackContext, name: &str, step: F) -> Progress
where
    F: FnOnce(&mut CallbackContext) -> Progress,
{
    if ctx.is_set(name) {
        log::debug!("{name}: already complete, skipping");
        return Progress::Done;
    }

    let progress = step(ctx);
    if progress.is_done() {
        ctx.set(name);
    }
    progress
}

/// Whether `name` has been recorded as complete
pub fn is_complete(ctx: &CallbackContext, name: &str) -> bool {
    ctx.is_set(name)
}
