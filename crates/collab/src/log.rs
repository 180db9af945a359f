//! Replicated action log.
//!
//! Entries carry a Lamport stamp and their origin client; the converged
//! total order is `(seq, origin)` ascending, which every replica computes
//! identically regardless of arrival order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shared::SceneAction;

/// Stable identity of a log entry
pub type EntryId = (u64, u64);

/// One replicated action, stamped at its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub origin: u64,
    pub action: SceneAction,
}

impl LogEntry {
    pub fn entry_id(&self) -> EntryId {
        (self.seq, self.origin)
    }
}

/// Where an integrated entry landed in the converged order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    /// Sorted after everything already known; safe to fold directly
    Tail,
    /// Landed before already-applied entries; the state needs a refold
    Mid,
    /// Already known; must not double-apply
    Duplicate,
}

/// Append-only, order-converging sequence of log entries
#[derive(Debug, Default)]
pub struct ActionLog {
    entries: Vec<LogEntry>,
    seen: HashSet<EntryId>,
    clock: u64,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in converged order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Stamp a locally-produced action and append it. Local entries always
    /// land at the tail: the stamp exceeds every seq seen so far.
    pub fn append_local(&mut self, origin: u64, action: SceneAction) -> LogEntry {
        self.clock += 1;
        let entry = LogEntry {
            seq: self.clock,
            origin,
            action,
        };
        self.seen.insert(entry.entry_id());
        self.entries.push(entry.clone());
        entry
    }

    /// Merge a remote entry into the converged order
    pub fn integrate(&mut self, entry: LogEntry) -> Integration {
        if !self.seen.insert(entry.entry_id()) {
            return Integration::Duplicate;
        }
        self.clock = self.clock.max(entry.seq);
        let key = (entry.seq, entry.origin);
        let pos = self
            .entries
            .partition_point(|e| (e.seq, e.origin) < key);
        let at_tail = pos == self.entries.len();
        self.entries.insert(pos, entry);
        if at_tail {
            Integration::Tail
        } else {
            Integration::Mid
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
        self.clock = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64, origin: u64) -> LogEntry {
        LogEntry {
            seq,
            origin,
            action: SceneAction::Remove { ids: vec![seq] },
        }
    }

    fn order(log: &ActionLog) -> Vec<EntryId> {
        log.entries().iter().map(|e| e.entry_id()).collect()
    }

    #[test]
    fn test_converged_order_is_arrival_independent() {
        let batch = [entry(1, 2), entry(1, 1), entry(2, 1), entry(2, 3)];

        let mut forward = ActionLog::new();
        for e in batch.iter().cloned() {
            forward.integrate(e);
        }
        let mut backward = ActionLog::new();
        for e in batch.iter().rev().cloned() {
            backward.integrate(e);
        }
        assert_eq!(order(&forward), order(&backward));
        assert_eq!(
            order(&forward),
            vec![(1, 1), (1, 2), (2, 1), (2, 3)]
        );
    }

    #[test]
    fn test_duplicate_delivery_is_detected() {
        let mut log = ActionLog::new();
        assert_eq!(log.integrate(entry(1, 1)), Integration::Tail);
        assert_eq!(log.integrate(entry(1, 1)), Integration::Duplicate);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_mid_insertion_is_reported() {
        let mut log = ActionLog::new();
        log.integrate(entry(5, 1));
        assert_eq!(log.integrate(entry(2, 2)), Integration::Mid);
        assert_eq!(order(&log), vec![(2, 2), (5, 1)]);
    }

    #[test]
    fn test_local_append_outstamps_remote() {
        let mut log = ActionLog::new();
        log.integrate(entry(7, 2));
        let local = log.append_local(1, SceneAction::Undo);
        assert_eq!(local.seq, 8);
        assert_eq!(order(&log), vec![(7, 2), (8, 1)]);
    }

    #[test]
    fn test_same_stamp_breaks_ties_by_origin() {
        let mut a = ActionLog::new();
        let mut b = ActionLog::new();
        // Two concurrently-created entries from different replicas
        a.integrate(entry(1, 1));
        a.integrate(entry(1, 2));
        b.integrate(entry(1, 2));
        b.integrate(entry(1, 1));
        assert_eq!(order(&a), order(&b));
    }

    #[test]
    fn test_clear_resets_clock() {
        let mut log = ActionLog::new();
        log.append_local(1, SceneAction::Undo);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.clock(), 0);
        assert_eq!(log.integrate(entry(1, 1)), Integration::Tail);
    }
}
