//! Error classification through chained rule sets
//!
//! A rule set is an ordered list of `(Matcher, Action)` rules plus an
//! optional fallback set. Classification checks code rules first, then
//! category rules, then message rules; if nothing in the set matches it
//! walks the fallback chain, and finally applies the engine default.
//!
//! Rule sets are layered: an operation that needs one override extends a
//! shared table with that single rule instead of copying the table.
//!
//! ```ignore
//! static DEFAULT: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
//!     ErrorRuleSet::builder()
//!         .with_error_codes(Action::FailWith(ErrorKind::Throttling), &["Throttling"])
//!         .build()
//! });
//!
//! static ADD_ROLE: LazyLock<Arc<ErrorRuleSet>> = LazyLock::new(|| {
//!     ErrorRuleSet::extend(&DEFAULT)
//!         .with_error_codes(Action::Ignore, &["DBInstanceRoleAlreadyExists"])
//!         .build()
//! });
//! ```

use crate::error::{ErrorCategory, ProviderError};
use crate::types::{ErrorKind, Progress};
use regex::Regex;
use std::sync::Arc;

/// What to do with a matched error
#[derive(Debug, Clone)]
pub enum Action {
    /// Treat the step as having achieved its effect
    Ignore,
    /// Fail the step with the given kind
    FailWith(ErrorKind),
    /// Decide from the error itself at classification time
    Conditional(fn(&ProviderError) -> Action),
}

impl Action {
    /// Resolve to a final disposition for `err`
    pub fn resolve(&self, err: &ProviderError) -> Disposition {
        match self {
            Self::Ignore => Disposition::Ignore,
            Self::FailWith(kind) => Disposition::FailWith(*kind),
            Self::Conditional(decide) => decide(err).resolve(err),
        }
    }
}

/// Result of classifying an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignore,
    FailWith(ErrorKind),
}

impl Disposition {
    /// Convert into step progress, carrying the error message on failure
    pub fn into_progress(self, err: &ProviderError) -> Progress {
        match self {
            Self::Ignore => Progress::Done,
            Self::FailWith(kind) => Progress::failed(kind, err.to_string()),
        }
    }
}

/// What a rule matches on
#[derive(Debug, Clone)]
pub enum Matcher {
    ByCode(String),
    ByCategory(ErrorCategory),
    ByMessage(Regex),
}

impl Matcher {
    pub fn matches(&self, err: &ProviderError) -> bool {
        match self {
            Self::ByCode(code) => err.has_code(code),
            Self::ByCategory(category) => err.category == *category,
            Self::ByMessage(pattern) => pattern.is_match(&err.message),
        }
    }

    /// Position in the matching order within one rule set
    fn precedence(&self) -> u8 {
        match self {
            Self::ByCode(_) => 0,
            Self::ByCategory(_) => 1,
            Self::ByMessage(_) => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorRule {
    pub matcher: Matcher,
    pub action: Action,
}

/// Ordered rules with an optional fallback set
#[derive(Debug, Clone, Default)]
pub struct ErrorRuleSet {
    rules: Vec<ErrorRule>,
    fallback: Option<Arc<ErrorRuleSet>>,
}

impl ErrorRuleSet {
    /// Start a rule set with no fallback
    pub fn builder() -> ErrorRuleSetBuilder {
        ErrorRuleSetBuilder::default()
    }

    /// Start a rule set that falls back to `base`
    pub fn extend(base: &Arc<ErrorRuleSet>) -> ErrorRuleSetBuilder {
        ErrorRuleSetBuilder {
            rules: Vec::new(),
            fallback: Some(Arc::clone(base)),
        }
    }

    /// An empty set; everything falls through to the engine default
    pub fn empty() -> Arc<ErrorRuleSet> {
        Arc::new(Self::default())
    }

    /// First action in this set (not its fallbacks) matching `err`
    fn lookup(&self, err: &ProviderError) -> Option<&Action> {
        (0..=2).find_map(|precedence| {
            self.rules
                .iter()
                .filter(|rule| rule.matcher.precedence() == precedence)
                .find(|rule| rule.matcher.matches(err))
                .map(|rule| &rule.action)
        })
    }

    /// Classify `err` against this set, its fallbacks, then the engine default
    pub fn classify(&self, err: &ProviderError) -> Disposition {
        let mut layer = Some(self);
        while let Some(set) = layer {
            if let Some(action) = set.lookup(err) {
                let disposition = action.resolve(err);
                log::debug!("classified '{err}' as {disposition:?}");
                return disposition;
            }
            layer = set.fallback.as_deref();
        }

        let disposition = default_disposition(err);
        log::debug!("no rule matched '{err}', default {disposition:?}");
        disposition
    }
}

/// Engine-wide mapping used when no rule set in the chain matches
pub fn default_disposition(err: &ProviderError) -> Disposition {
    match err.category {
        ErrorCategory::Throttling => Disposition::FailWith(ErrorKind::Throttling),
        _ => Disposition::FailWith(ErrorKind::InternalFailure),
    }
}

/// Classify `err` with `rules`
pub fn classify(err: &ProviderError, rules: &ErrorRuleSet) -> Disposition {
    rules.classify(err)
}

/// Builder for [`ErrorRuleSet`]
#[derive(Debug, Default)]
pub struct ErrorRuleSetBuilder {
    rules: Vec<ErrorRule>,
    fallback: Option<Arc<ErrorRuleSet>>,
}

impl ErrorRuleSetBuilder {
    /// Apply `action` to errors carrying any of `codes`
    pub fn with_error_codes(mut self, action: Action, codes: &[&str]) -> Self {
        for code in codes {
            self.rules.push(ErrorRule {
                matcher: Matcher::ByCode((*code).to_string()),
                action: action.clone(),
            });
        }
        self
    }

    /// Apply `action` to errors in any of `categories`
    pub fn with_categories(mut self, action: Action, categories: &[ErrorCategory]) -> Self {
        for category in categories {
            self.rules.push(ErrorRule {
                matcher: Matcher::ByCategory(*category),
                action: action.clone(),
            });
        }
        self
    }

    /// Apply `action` to errors whose message matches `pattern`
    pub fn with_message(mut self, action: Action, pattern: Regex) -> Self {
        self.rules.push(ErrorRule {
            matcher: Matcher::ByMessage(pattern),
            action,
        });
        self
    }

    pub fn build(self) -> Arc<ErrorRuleSet> {
        Arc::new(ErrorRuleSet {
            rules: self.rules,
            fallback: self.fallback,
        })
    }
}
