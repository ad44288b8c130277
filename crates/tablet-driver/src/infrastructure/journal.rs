//! Shared call log for the in-memory test doubles.
//!
//! The relay takes ownership of its shell and backend, so tests cannot inspect
//! those doubles after a run.  Both doubles instead append to a cloned
//! [`CallJournal`], which keeps one ordered record across the SSH and uinput
//! sides.  That makes teardown order directly assertable.

use std::sync::{Arc, Mutex, PoisonError};

/// Ordered, cloneable log of calls made on test doubles.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of every entry in call order.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Position of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}
