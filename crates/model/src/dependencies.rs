//! Phase bookkeeping across the models of a document.
//!
//! Every phase entry point reports to the tracker, whether it did work or
//! found its flag clear. Each report and each data change is stamped with a
//! revision, so callers can tell whether a phase result is older than the
//! data it was computed from.

use rustc_hash::FxHashMap;

/// One of the four update phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Rebuild,
    Recalculate,
    Revalidate,
    Refresh,
}

/// Monotonic counter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub const INITIAL: Self = Self(0);

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_newer_than(self, other: Self) -> bool {
        self.0 > other.0
    }
}

/// A phase entry point having been invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    pub model: String,
    pub phase: Phase,
    /// Whether the flag was set and work was done.
    pub performed: bool,
    pub revision: Revision,
}

#[derive(Debug, Default)]
pub struct DependencyTracker {
    current: Revision,
    history: Vec<PhaseRecord>,
    completed: FxHashMap<(String, Phase), Revision>,
    changed: FxHashMap<String, Revision>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> Revision {
        self.current = Revision(self.current.0 + 1);
        self.current
    }

    pub const fn revision(&self) -> Revision {
        self.current
    }

    /// Instance data of `model` changed.
    pub fn data_changed(&mut self, model: &str) -> Revision {
        let revision = self.bump();
        self.changed.insert(model.to_owned(), revision);
        revision
    }

    /// A phase entry point of `model` returned.
    pub fn phase_completed(&mut self, model: &str, phase: Phase, performed: bool) {
        let revision = self.bump();
        self.completed.insert((model.to_owned(), phase), revision);
        self.history.push(PhaseRecord {
            model: model.to_owned(),
            phase,
            performed,
            revision,
        });
    }

    /// Whether `model` changed after `phase` last completed on it.
    pub fn is_stale(&self, model: &str, phase: Phase) -> bool {
        let changed = self.changed.get(model).copied().unwrap_or(Revision::INITIAL);
        match self.completed.get(&(model.to_owned(), phase)) {
            Some(completed) => changed.is_newer_than(*completed),
            None => true,
        }
    }

    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Phases of `model` that did work, in invocation order.
    pub fn performed(&self, model: &str) -> Vec<Phase> {
        self.history
            .iter()
            .filter(|record| record.performed && record.model == model)
            .map(|record| record.phase)
            .collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if staleness does not follow data changes.
    #[test]
    fn phase_is_stale_until_completed_after_change() {
        let mut tracker = DependencyTracker::new();
        assert!(tracker.is_stale("model", Phase::Refresh));
        tracker.phase_completed("model", Phase::Refresh, true);
        assert!(!tracker.is_stale("model", Phase::Refresh));
        tracker.data_changed("model");
        assert!(tracker.is_stale("model", Phase::Refresh));
    }

    /// # Panics
    /// Panics if skipped phases are reported as performed.
    #[test]
    fn performed_filters_noops() {
        let mut tracker = DependencyTracker::new();
        tracker.phase_completed("model", Phase::Rebuild, false);
        tracker.phase_completed("model", Phase::Recalculate, true);
        assert_eq!(tracker.performed("model"), vec![Phase::Recalculate]);
        assert_eq!(tracker.history().len(), 2);
    }
}
