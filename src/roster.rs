//! The supervisor's ordered roster of live workers.
//!
//! Owned exclusively by the supervisor event loop, so every mutation is a
//! single critical section by construction; asynchronous exit pruning and
//! operator commands are serialized through the same owner.
//!
//! Positions shift when an exited worker is pruned from the middle, so an
//! index typed by the operator can land on a different worker than the
//! one last listed. That instability is inherited from the interface
//! (index-addressed commands) and is documented rather than hidden.

use nix::unistd::Pid;

/// One tracked worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub pid: Pid,
    /// Display name generated from insertion position, e.g. `C_00`.
    pub label: String,
    /// Local mirror of the last permission command issued. Optimistic:
    /// the worker acknowledges nothing, so this can diverge if a signal
    /// is lost.
    pub permitted: bool,
}

/// Insertion-ordered collection of worker records.
#[derive(Debug)]
pub struct Roster {
    records: Vec<WorkerRecord>,
    label_prefix: String,
}

impl Roster {
    pub fn new(label_prefix: &str) -> Self {
        Self {
            records: Vec::new(),
            label_prefix: label_prefix.to_string(),
        }
    }

    /// Append a new record for `pid`, not yet permitted to report.
    pub fn push(&mut self, pid: Pid) -> &WorkerRecord {
        let label = format!("{}{:02}", self.label_prefix, self.records.len());
        self.records.push(WorkerRecord {
            pid,
            label,
            permitted: false,
        });
        self.records.last().expect("record just pushed")
    }

    /// Remove and return the most recently appended record.
    pub fn pop_last(&mut self) -> Option<WorkerRecord> {
        self.records.pop()
    }

    pub fn get(&self, index: usize) -> Option<&WorkerRecord> {
        self.records.get(index)
    }

    /// Update the permission mirror at `index`. Returns the record, or
    /// `None` when the index is out of range (reported, non-fatal).
    pub fn set_permitted(&mut self, index: usize, permitted: bool) -> Option<&WorkerRecord> {
        let record = self.records.get_mut(index)?;
        record.permitted = permitted;
        Some(record)
    }

    /// Prune the record for an exited `pid`, compacting the roster and
    /// preserving survivor order. A pid that is not tracked (already
    /// deleted by the operator, or pruned once before) is a no-op.
    pub fn remove_pid(&mut self, pid: Pid) -> Option<WorkerRecord> {
        let index = self.records.iter().position(|r| r.pid == pid)?;
        Some(self.records.remove(index))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.records.iter()
    }
}
