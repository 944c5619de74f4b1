//! Strategy table - first matching predicate picks the implementation

/// Ordered `(predicate, implementation)` pairs with an optional default
pub struct StrategyTable<M, I> {
    entries: Vec<(fn(&M) -> bool, I)>,
    default: Option<I>,
}

impl<M, I> StrategyTable<M, I> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default: None,
        }
    }

    /// Add an entry; entries are consulted in insertion order
    pub fn when(mut self, predicate: fn(&M) -> bool, implementation: I) -> Self {
        self.entries.push((predicate, implementation));
        self
    }

    /// Implementation used when no predicate matches
    pub fn otherwise(mut self, implementation: I) -> Self {
        self.default = Some(implementation);
        self
    }

    /// Pick the implementation for `model`
    pub fn select(&self, model: &M) -> Option<&I> {
        self.entries
            .iter()
            .find(|(predicate, _)| predicate(model))
            .map(|(_, implementation)| implementation)
            .or(self.default.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.default.is_none()
    }
}

impl<M, I> Default for StrategyTable<M, I> {
    fn default() -> Self {
        Self::new()
    }
}
