//! Identifier generation for protocol messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier carried by protocol messages.
///
/// Identifiers are opaque strings on the wire.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Construct an identifier from its string form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Source of unique identifiers for one tracker.
///
/// Uniqueness only holds within a single generator instance; workers running
/// in separate processes each own a generator and may produce equal ids.
pub trait IdGenerator {
    /// Produce an identifier never returned before by this generator.
    fn next_id(&mut self) -> Id;
}

/// Generator yielding `"0"`, `"1"`, `"2"`, …
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ids::{IdGenerator, IncrementingIds};
///
/// let mut ids = IncrementingIds::default();
/// assert_eq!(ids.next_id().as_str(), "0");
/// assert_eq!(ids.next_id().as_str(), "1");
/// ```
#[derive(Debug, Default, Clone)]
pub struct IncrementingIds {
    next: u64,
}

impl IncrementingIds {
    /// Start a generator whose first identifier is `start`.
    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self { next: start }
    }
}

impl IdGenerator for IncrementingIds {
    fn next_id(&mut self) -> Id {
        let id = Id(self.next.to_string());
        // Exhausting a u64 would take centuries of ids per nanosecond.
        self.next = self.next.saturating_add(1);
        id
    }
}
