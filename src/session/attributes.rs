use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

// -----------------------------------------------------------------------------
// ----- Attributes ------------------------------------------------------------

pub type AttributeValue = Arc<dyn Any + Send + Sync>;

/// Per-session key/value bag for the protocol engine's own bookkeeping.
#[derive(Default)]
pub(crate) struct Attributes {
    by_key: HashMap<String, AttributeValue>,
}

impl Attributes {
    pub(crate) fn get(&self, key: &str) -> Option<AttributeValue> {
        self.by_key.get(key).cloned()
    }

    /// Returns the previous value stored under `key`, if any.
    pub(crate) fn insert(&mut self, key: String, value: AttributeValue) -> Option<AttributeValue> {
        self.by_key.insert(key, value)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.by_key.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.by_key.keys()).finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
