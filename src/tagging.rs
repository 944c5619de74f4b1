//! Tag reconciliation
//!
//! Tags come in three partitions by provenance. System tags are only ever
//! set at creation. Stack and resource tags are reconciled one key at a
//! time, each partition with its own error rules.

use crate::model::Tag;
use crate::provider::DbApi;
use crate::rules;
use crate::translate;
use reconcile::{CallbackContext, ErrorKind, Poller, Progress, Step, set, step, tracker};
use serde::{Deserialize, Serialize};
use std::slice;

/// Sub-context holding tag progress
pub const TAGGING: &str = "tagging";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggingContext {
    /// Creation succeeded with system tags only; the rest is applied later
    pub soft_fail_tags: bool,
}

impl TaggingContext {
    pub fn load(ctx: &CallbackContext) -> Result<Self, Progress> {
        ctx.sub_context::<Self>(TAGGING)
            .map(Option::unwrap_or_default)
            .map_err(|err| Progress::failed(ErrorKind::InternalFailure, err.to_string()))
    }

    pub fn save(&self, ctx: &mut CallbackContext) -> Result<(), Progress> {
        ctx.put_sub_context(TAGGING, self)
            .map_err(|err| Progress::failed(ErrorKind::InternalFailure, err.to_string()))
    }
}

/// Tags partitioned by provenance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSet {
    /// Set by the platform; the highest trust level
    pub system: Vec<Tag>,
    /// Applied to every resource of the stack
    pub stack: Vec<Tag>,
    /// Declared on the resource itself
    pub resource: Vec<Tag>,
}

impl TagSet {
    /// Every tag, later partitions overriding earlier ones on key clashes
    pub fn all(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::new();
        for tag in self.system.iter().chain(&self.stack).chain(&self.resource) {
            tags.retain(|t| t.key != tag.key);
            tags.push(tag.clone());
        }
        tags
    }

    /// Only the system partition
    pub fn system_only(&self) -> Self {
        Self {
            system: self.system.clone(),
            ..Self::default()
        }
    }

    pub fn has_non_system(&self) -> bool {
        !self.stack.is_empty() || !self.resource.is_empty()
    }
}

/// Run a create `attempt` with every tag, falling back to system tags only
///
/// When soft-fail is enabled and the attempt is denied for permissions
/// before its call went through, the creation is issued again with system
/// tags only and `soft_fail_tags` is recorded so a later tag stage applies
/// the rest. A resumed invocation keeps using the reduced set.
pub fn create_with_tag_fallback<A>(
    ctx: &mut CallbackContext,
    step_name: &str,
    tags: &TagSet,
    soft_fail_enabled: bool,
    attempt: A,
) -> Progress
where
    A: Fn(&[Tag], &mut CallbackContext) -> Progress,
{
    let mut tagging = match TaggingContext::load(ctx) {
        Ok(tagging) => tagging,
        Err(progress) => return progress,
    };

    if tagging.soft_fail_tags {
        return attempt(&tags.system, ctx);
    }

    let progress = attempt(&tags.all(), ctx);
    let denied = progress.error_kind() == Some(ErrorKind::AccessDenied);
    if !denied || !soft_fail_enabled || !tags.has_non_system() || step::is_invoked(ctx, step_name)
    {
        return progress;
    }

    log::warn!("{step_name}: tagging denied, retrying with system tags only");
    tagging.soft_fail_tags = true;
    if let Err(progress) = tagging.save(ctx) {
        return progress;
    }
    attempt(&tags.system, ctx)
}

/// Reconcile stack and resource tags from `previous` toward `desired`
///
/// With `soft_fail`, stack tags the caller may not manage are skipped;
/// resource tags always fail hard. Removals of every partition run before
/// any addition, since the provider removes tags by key. A key that is
/// still desired in some partition is never removed; its addition
/// overwrites the value instead.
pub fn update_tags(
    api: &dyn DbApi,
    identifier: &str,
    previous: &TagSet,
    desired: &TagSet,
    soft_fail: bool,
    ctx: &mut CallbackContext,
    poller: &Poller<'_>,
) -> Progress {
    let stack_rules = if soft_fail {
        &*rules::SOFT_FAIL_TAG
    } else {
        &*rules::DEFAULT
    };

    let partitions = [
        ("tags.stack", set::diff(&previous.stack, &desired.stack), stack_rules),
        (
            "tags.resource",
            set::diff(&previous.resource, &desired.resource),
            &*rules::DEFAULT,
        ),
    ];
    let desired_keys: Vec<String> = desired.all().into_iter().map(|t| t.key).collect();

    for (set_name, diff, rules) in &partitions {
        for &tag in &diff.to_remove {
            if desired_keys.contains(&tag.key) {
                log::debug!("{set_name}: '{}' is still desired, not removing", tag.key);
                continue;
            }
            let name = set::item_key(set_name, "remove", tag);
            let progress = tracker::run_once(ctx, &name, |ctx| {
                Step::new(
                    name.as_str(),
                    |tag: &Tag| translate::untag_request(identifier, slice::from_ref(tag)),
                    |request| api.remove_tags_from_resource(request),
                )
                .rules(rules)
                .evaluate(tag, ctx, poller)
            });
            if !progress.is_done() {
                return progress;
            }
        }
    }

    for (set_name, diff, rules) in &partitions {
        for &tag in &diff.to_add {
            let name = set::item_key(set_name, "add", tag);
            let progress = tracker::run_once(ctx, &name, |ctx| {
                Step::new(
                    name.as_str(),
                    |tag: &Tag| translate::tag_request(identifier, slice::from_ref(tag)),
                    |request| api.add_tags_to_resource(request),
                )
                .rules(rules)
                .evaluate(tag, ctx, poller)
            });
            if !progress.is_done() {
                return progress;
            }
        }
    }

    Progress::Done
}
