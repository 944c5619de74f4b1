//! Resumable context threaded through every invocation
//!
//! The scheduler persists this value between invocations and hands it back
//! unchanged. Anything that must survive a suspension point lives here.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Serializable progress state of one logical operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackContext {
    /// Completion flags; monotonic within one logical operation
    #[serde(default)]
    flags: BTreeSet<String>,

    /// Consecutive positive observations per probe
    #[serde(default)]
    probes: BTreeMap<String, u32>,

    /// First-seen timestamps (stabilization start times)
    #[serde(default)]
    timestamps: BTreeMap<String, DateTime<Utc>>,

    /// Number of unsuccessful polls per stabilization
    #[serde(default)]
    polls: BTreeMap<String, u32>,

    /// Child procedure state (tagging, role reconciliation, persisted responses)
    #[serde(default)]
    sub_contexts: BTreeMap<String, serde_json::Value>,
}

impl CallbackContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a completion flag is set
    pub fn is_set(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// Set a completion flag. Flags are never cleared.
    pub fn set(&mut self, flag: &str) {
        if self.flags.insert(flag.to_string()) {
            log::trace!("flag set: {flag}");
        }
    }

    /// All flags currently set, in order
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    /// Current consecutive-success count of a probe
    pub fn probe_count(&self, probe: &str) -> u32 {
        self.probes.get(probe).copied().unwrap_or(0)
    }

    pub(crate) fn set_probe_count(&mut self, probe: &str, count: u32) {
        self.probes.insert(probe.to_string(), count);
    }

    /// Record `now` under `name` unless already recorded; returns the stored value
    pub fn timestamp_once(&mut self, name: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.timestamps.entry(name.to_string()).or_insert(now)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.timestamps.get(name).copied()
    }

    /// Time elapsed since the timestamp recorded under `name`
    pub fn elapsed(&self, name: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.timestamp(name).map(|start| now - start)
    }

    /// Number of unsuccessful polls recorded for a stabilization
    pub fn poll_count(&self, name: &str) -> u32 {
        self.polls.get(name).copied().unwrap_or(0)
    }

    /// Bump the poll counter, returning the count before the bump
    pub(crate) fn next_poll(&mut self, name: &str) -> u32 {
        let count = self.polls.entry(name.to_string()).or_insert(0);
        let previous = *count;
        *count += 1;
        previous
    }

    /// Forget stabilization start times, poll counts and probe counters
    ///
    /// Completion flags and recorded responses stay, so a retry of a failed
    /// operation polls again with a fresh deadline instead of reissuing calls.
    pub fn restart_stabilizations(&mut self) {
        self.timestamps.clear();
        self.polls.clear();
        self.probes.clear();
    }

    /// Decode a named sub-context, `None` if it was never stored
    pub fn sub_context<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.sub_contexts
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| Error::SubContextDecode {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Store a named sub-context, replacing any previous value
    pub fn put_sub_context<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).map_err(|source| Error::SubContextEncode {
            name: name.to_string(),
            source,
        })?;
        self.sub_contexts.insert(name.to_string(), encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Child {
        done: bool,
        items: Vec<String>,
    }

    #[test]
    fn test_flags_are_monotonic() {
        let mut ctx = CallbackContext::new();
        assert!(!ctx.is_set("create"));
        ctx.set("create");
        ctx.set("create");
        assert!(ctx.is_set("create"));
        assert_eq!(ctx.flags().collect::<Vec<_>>(), vec!["create"]);
    }

    #[test]
    fn test_timestamp_once_keeps_first_value() {
        let mut ctx = CallbackContext::new();
        let first = Utc::now();
        let later = first + TimeDelta::seconds(30);

        assert_eq!(ctx.timestamp_once("create", first), first);
        assert_eq!(ctx.timestamp_once("create", later), first);
        assert_eq!(ctx.elapsed("create", later), Some(TimeDelta::seconds(30)));
        assert_eq!(ctx.elapsed("missing", later), None);
    }

    #[test]
    fn test_restart_stabilizations_keeps_flags() {
        let mut ctx = CallbackContext::new();
        ctx.set("create.invoked");
        ctx.timestamp_once("create.stabilize", Utc::now());
        ctx.next_poll("create.stabilize");
        ctx.set_probe_count("db1.stabilized", 2);

        ctx.restart_stabilizations();

        assert!(ctx.is_set("create.invoked"));
        assert_eq!(ctx.timestamp("create.stabilize"), None);
        assert_eq!(ctx.poll_count("create.stabilize"), 0);
        assert_eq!(ctx.probe_count("db1.stabilized"), 0);
    }

    #[test]
    fn test_sub_context_roundtrip_through_json() {
        let mut ctx = CallbackContext::new();
        let child = Child {
            done: true,
            items: vec!["a".into()],
        };
        ctx.put_sub_context("child", &child).unwrap();

        let json = serde_json::to_string(&ctx).unwrap();
        let restored: CallbackContext = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.sub_context::<Child>("child").unwrap(), Some(child));
        assert_eq!(restored.sub_context::<Child>("other").unwrap(), None);
    }

    #[test]
    fn test_sub_context_type_mismatch_is_an_error() {
        let mut ctx = CallbackContext::new();
        ctx.put_sub_context("child", &"not a struct").unwrap();
        assert!(ctx.sub_context::<Child>("child").is_err());
    }

    #[test]
    fn test_empty_json_deserializes_to_default() {
        let ctx: CallbackContext = serde_json::from_str("{}").unwrap();
        assert_eq!(ctx, CallbackContext::default());
    }
}
