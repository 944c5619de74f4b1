//! Probe counter - debounce for flaky-positive checks
//!
//! Some checks report success too early because of read-after-write lag.
//! A probe only passes after `threshold` consecutive positive observations;
//! any negative observation resets it to zero. Counts live in the context,
//! keyed by probe name, so separate probes never interfere.

use crate::context::CallbackContext;

/// Feed one observation into the probe `name`
///
/// Returns `true` once `threshold` consecutive positives have been seen,
/// clearing the counter at that point.
pub fn check(ctx: &mut CallbackContext, name: &str, threshold: u32, observed: bool) -> bool {
    if !observed {
        if ctx.probe_count(name) > 0 {
            log::debug!("probe {name}: negative observation, resetting");
        }
        ctx.set_probe_count(name, 0);
        return false;
    }

    let count = ctx.probe_count(name) + 1;
    if count >= threshold {
        ctx.set_probe_count(name, 0);
        return true;
    }

    log::debug!("probe {name}: {count}/{threshold} consecutive positives");
    ctx.set_probe_count(name, count);
    false
}

/// Evaluate a fallible check through the probe `name`
///
/// An error leaves the counter untouched.
pub fn with_probing<E, F>(
    ctx: &mut CallbackContext,
    name: &str,
    threshold: u32,
    check_fn: F,
) -> Result<bool, E>
where
    F: FnOnce() -> Result<bool, E>,
{
    let observed = check_fn()?;
    Ok(check(ctx, name, threshold, observed))
}
