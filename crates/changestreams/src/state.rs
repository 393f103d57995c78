use std::collections::HashMap;

use parking_lot::Mutex;

use crate::records::ROOT_PARTITION_TOKEN;

/// Lifecycle of a partition. Partitions missing from the table have not been
/// seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Reading,
    Finished,
}

/// Tracks which partitions are being read and which have been fully read.
///
/// States only ever move forward: absent -> Reading -> Finished. A single lock
/// guards the whole table and is never held across an await point.
#[derive(Debug, Default)]
pub struct PartitionStateTable {
    states: Mutex<HashMap<String, PartitionState>>,
}

impl PartitionStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a partition for reading.
    ///
    /// Returns false if the partition was already claimed, which happens when
    /// multiple parents merge into the same child.
    pub fn try_mark_reading(&self, token: &str) -> bool {
        let mut states = self.states.lock();
        if states.contains_key(token) {
            return false;
        }
        states.insert(token.to_string(), PartitionState::Reading);
        true
    }

    /// Mark a partition as fully read.
    ///
    /// # Panics
    ///
    /// Panics if the partition is not currently being read.
    pub fn mark_finished(&self, token: &str) {
        let mut states = self.states.lock();
        match states.get_mut(token) {
            Some(state @ PartitionState::Reading) => *state = PartitionState::Finished,
            other => panic!("partition '{token}' marked finished from state {other:?}"),
        }
    }

    pub fn is_finished(&self, token: &str) -> bool {
        self.states.lock().get(token) == Some(&PartitionState::Finished)
    }

    /// Check if every parent of a child partition has been fully read.
    ///
    /// The root partition is always considered available. A child without
    /// parents can start immediately.
    pub fn can_start<S: AsRef<str>>(&self, parents: &[S]) -> bool {
        let states = self.states.lock();
        parents.iter().all(|parent| {
            let parent = parent.as_ref();
            parent == ROOT_PARTITION_TOKEN
                || states.get(parent) == Some(&PartitionState::Finished)
        })
    }

    pub fn state(&self, token: &str) -> Option<PartitionState> {
        self.states.lock().get(token).copied()
    }
}
