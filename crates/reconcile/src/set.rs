//! Set reconciler - diff and apply for add/remove style sub-resources
//!
//! Removals run before additions, one at a time. Each item runs under its
//! own completion flag, so after a partial failure the context shows
//! exactly which items were applied. The diff itself is recomputed on
//! every invocation; previous and desired are stable inputs for one
//! logical operation.

use crate::context::CallbackContext;
use crate::tracker;
use crate::types::Progress;

/// An element of a reconciled set
pub trait SetMember {
    /// Stable identity, used to name the per-item completion flag
    fn identity(&self) -> String;

    /// Equality used for the set difference
    fn same_as(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

/// Items to remove and add, in application order
#[derive(Debug)]
pub struct SetDiff<'s, T> {
    pub to_remove: Vec<&'s T>,
    pub to_add: Vec<&'s T>,
}

impl<T> SetDiff<'_, T> {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Compute `previous - desired` and `desired - previous`
pub fn diff<'s, T: SetMember>(previous: &'s [T], desired: &'s [T]) -> SetDiff<'s, T> {
    let to_remove = previous
        .iter()
        .filter(|p| !desired.iter().any(|d| d.same_as(p)))
        .collect();
    let to_add = desired
        .iter()
        .filter(|d| !previous.iter().any(|p| p.same_as(d)))
        .collect();
    SetDiff { to_remove, to_add }
}

/// Reconcile `previous` toward `desired`
///
/// `remove_one` and `add_one` are each expected to evaluate a full step
/// for one item. The first item that does not complete stops the
/// reconciliation and its progress is returned.
pub fn reconcile<T, R, A>(
    ctx: &mut CallbackContext,
    set_name: &str,
    previous: &[T],
    desired: &[T],
    mut remove_one: R,
    mut add_one: A,
) -> Progress
where
    T: SetMember,
    R: FnMut(&T, &mut CallbackContext) -> Progress,
    A: FnMut(&T, &mut CallbackContext) -> Progress,
{
    let diff = diff(previous, desired);
    if diff.is_empty() {
        log::debug!("{set_name}: nothing to reconcile");
        return Progress::Done;
    }

    log::info!(
        "{set_name}: {} to remove, {} to add",
        diff.to_remove.len(),
        diff.to_add.len()
    );

    for item in diff.to_remove {
        let name = item_key(set_name, "remove", item);
        let progress = tracker::run_once(ctx, &name, |ctx| remove_one(item, ctx));
        if !progress.is_done() {
            return progress;
        }
    }

    for item in diff.to_add {
        let name = item_key(set_name, "add", item);
        let progress = tracker::run_once(ctx, &name, |ctx| add_one(item, ctx));
        if !progress.is_done() {
            return progress;
        }
    }

    Progress::Done
}

/// Completion flag (and step name) for one item of a set
pub fn item_key<T: SetMember>(set_name: &str, action: &str, item: &T) -> String {
    format!("{set_name}.{action}.{}", item.identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str);

    impl SetMember for Item {
        fn identity(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pair(&'static str, &'static str);

    impl SetMember for Pair {
        fn identity(&self) -> String {
            self.0.to_string()
        }

        fn same_as(&self, other: &Self) -> bool {
            self == other
        }
    }

    #[test]
    fn test_removes_before_adds_and_skips_common() {
        let previous = [Item("A"), Item("B")];
        let desired = [Item("B"), Item("C")];
        let log = RefCell::new(Vec::new());
        let mut ctx = CallbackContext::new();

        let progress = reconcile(
            &mut ctx,
            "roles",
            &previous,
            &desired,
            |item, _| {
                log.borrow_mut().push(format!("remove {}", item.0));
                Progress::Done
            },
            |item, _| {
                log.borrow_mut().push(format!("add {}", item.0));
                Progress::Done
            },
        );

        assert!(progress.is_done());
        assert_eq!(*log.borrow(), vec!["remove A", "add C"]);
    }

    #[test]
    fn test_changed_value_is_replaced() {
        let previous = [Pair("env", "dev")];
        let desired = [Pair("env", "prod")];

        let diff = diff(&previous, &desired);
        assert_eq!(diff.to_remove, vec![&Pair("env", "dev")]);
        assert_eq!(diff.to_add, vec![&Pair("env", "prod")]);
    }

    #[test]
    fn test_partial_failure_resumes_where_it_stopped() {
        let previous = [Item("A")];
        let desired = [Item("B"), Item("C")];
        let calls = RefCell::new(Vec::new());
        let mut ctx = CallbackContext::new();

        let first = reconcile(
            &mut ctx,
            "roles",
            &previous,
            &desired,
            |item, _| {
                calls.borrow_mut().push(format!("remove {}", item.0));
                Progress::Done
            },
            |item, _| {
                calls.borrow_mut().push(format!("add {}", item.0));
                if item.0 == "C" {
                    Progress::failed(ErrorKind::Throttling, "slow down")
                } else {
                    Progress::Done
                }
            },
        );
        assert_eq!(first.error_kind(), Some(ErrorKind::Throttling));
        assert!(ctx.is_set("roles.remove.A"));
        assert!(ctx.is_set("roles.add.B"));
        assert!(!ctx.is_set("roles.add.C"));

        calls.borrow_mut().clear();
        let second = reconcile(
            &mut ctx,
            "roles",
            &previous,
            &desired,
            |item, _| {
                calls.borrow_mut().push(format!("remove {}", item.0));
                Progress::Done
            },
            |item, _| {
                calls.borrow_mut().push(format!("add {}", item.0));
                Progress::Done
            },
        );

        assert!(second.is_done());
        assert_eq!(*calls.borrow(), vec!["add C"]);
    }

    #[test]
    fn test_identical_sets_do_nothing() {
        let items = [Item("A")];
        let mut ctx = CallbackContext::new();
        let progress = reconcile(
            &mut ctx,
            "tags",
            &items,
            &items,
            |_, _| panic!("no removals expected"),
            |_, _| panic!("no additions expected"),
        );
        assert!(progress.is_done());
    }
}
