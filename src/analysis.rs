//! Analysis trigger bookkeeping
//!
//! Decides when the external text-analysis collaborator runs, so activity
//! does not re-analyze on every keystroke:
//!
//! - first analysis: the conversation has no result yet, at least one
//!   message exists, and we have never called for it;
//! - re-analysis: the message count is a positive multiple of the batch
//!   size and differs from the count at the last call.
//!
//! Never concurrent per conversation: a trigger while one is in flight is
//! dropped, not queued. A failed call is not retried until the count moves
//! to the next trigger point (the count is recorded at dispatch time).
//!
//! The decision is pure given the tracker state; the dispatcher owns the
//! tracker and performs the actual collaborator call.

use std::collections::{HashMap, HashSet};

use crate::ids::ConversationId;

#[derive(Debug, Default)]
pub struct AnalysisTracker {
    /// Message count at the last dispatched call, per conversation
    last_count: HashMap<ConversationId, usize>,
    in_flight: HashSet<ConversationId>,
}

impl AnalysisTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an analysis call should be dispatched now.
    ///
    /// `has_result` is whether the conversation already carries a derived
    /// summary; `message_count` is the window's current count.
    pub fn should_trigger(
        &self,
        id: &ConversationId,
        message_count: usize,
        has_result: bool,
        batch: usize,
    ) -> bool {
        if message_count == 0 || batch == 0 || self.in_flight.contains(id) {
            return false;
        }
        if !has_result && !self.last_count.contains_key(id) {
            return true;
        }
        message_count % batch == 0 && self.last_count.get(id) != Some(&message_count)
    }

    /// Record a dispatched call.
    pub fn begin(&mut self, id: ConversationId, message_count: usize) {
        self.last_count.insert(id.clone(), message_count);
        self.in_flight.insert(id);
    }

    /// Record a completed (or failed) call.
    pub fn finish(&mut self, id: &ConversationId) {
        self.in_flight.remove(id);
    }

    pub fn is_in_flight(&self, id: &ConversationId) -> bool {
        self.in_flight.contains(id)
    }
}
