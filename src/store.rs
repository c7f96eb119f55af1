//! Ordered, deduplicated in-memory mirror of conversation summaries
//!
//! The store is not safe for concurrent mutation; the dispatcher owns it
//! and is the single serialization point. It knows nothing about the
//! active selection — unread suppression for the open thread is enforced
//! by the dispatcher, which simply resets the active conversation's
//! counter after every merge and never routes increments to it.
//!
//! Discarded-by-identity ids are tombstoned so a rotated-away thread id
//! can never resurface, even from a late poll snapshot that still carries
//! it (see `identity`).

use std::collections::HashSet;

use crate::identity;
use crate::ids::{ConversationId, ParticipantId};
use crate::types::{Conversation, ConversationPatch, Message};

#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Sorted by `last_message_time` descending (push-inserted rows go to
    /// the head regardless; the next merge re-sorts)
    items: Vec<Conversation>,
    /// Ids discarded by identity resolution; never re-admitted
    tombstones: HashSet<ConversationId>,
    total: usize,
    has_more: bool,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.items.iter().find(|c| &c.id == id)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_tombstoned(&self, id: &ConversationId) -> bool {
        self.tombstones.contains(id)
    }

    fn index_of(&self, id: &ConversationId) -> Option<usize> {
        self.items.iter().position(|c| &c.id == id)
    }

    fn index_of_participant(&self, participant: &ParticipantId) -> Option<usize> {
        self.items
            .iter()
            .position(|c| c.participant_id.as_ref() == Some(participant))
    }

    /// Replace the store's contents with a fresh first page (see
    /// `merge_snapshot` for the per-row rules). Unread counts are taken
    /// from the snapshot; the dispatcher re-zeros the active selection
    /// afterwards.
    pub fn replace_page(&mut self, rows: Vec<Conversation>, has_more: bool, total: usize) {
        let merged = self.merge_snapshot(rows);
        self.finish_merge(merged, has_more, total);
    }

    /// Reconcile a silent first-page re-fetch: replace semantics over the
    /// first-page span (rows the snapshot no longer carries are dropped, so
    /// upstream deletions converge), while rows the user has paged into
    /// beyond the first page stay resident.
    pub fn refresh_first_page(
        &mut self,
        rows: Vec<Conversation>,
        has_more: bool,
        total: usize,
        page_size: usize,
    ) {
        let tail: Vec<Conversation> = self.items.iter().skip(page_size).cloned().collect();
        let mut merged = self.merge_snapshot(rows);
        let mut seen: HashSet<ConversationId> = merged.iter().map(|c| c.id.clone()).collect();
        for row in tail {
            if seen.insert(row.id.clone()) {
                merged.push(row);
            }
        }
        self.finish_merge(merged, has_more, total);
    }

    /// Per-row merge of a fresh snapshot against the current mirror:
    /// content fields only move forward (stamp-gated), tombstoned incoming
    /// ids are dropped and their surviving participant row is retained
    /// instead.
    fn merge_snapshot(&self, rows: Vec<Conversation>) -> Vec<Conversation> {
        let mut merged: Vec<Conversation> = Vec::with_capacity(rows.len());
        let mut seen: HashSet<ConversationId> = HashSet::with_capacity(rows.len());

        for row in rows {
            if self.tombstones.contains(&row.id) {
                // The participant's surviving row stays in the mirror even
                // though the poll no longer knows about it.
                if let Some(participant) = &row.participant_id {
                    if let Some(idx) = self.index_of_participant(participant) {
                        let survivor = self.items[idx].clone();
                        if seen.insert(survivor.id.clone()) {
                            merged.push(survivor);
                        }
                    }
                }
                continue;
            }
            let item = match self.index_of(&row.id) {
                Some(idx) => Self::merge_into_existing(&self.items[idx], row),
                None => row,
            };
            if seen.insert(item.id.clone()) {
                merged.push(item);
            }
        }

        merged
    }

    /// Append a later page to the existing list. Ids already present are
    /// merged in place rather than reintroduced.
    pub fn append_page(&mut self, rows: Vec<Conversation>, has_more: bool, total: usize) {
        let mut merged = std::mem::take(&mut self.items);
        let mut seen: HashSet<ConversationId> = merged.iter().map(|c| c.id.clone()).collect();

        for row in rows {
            if self.tombstones.contains(&row.id) {
                continue;
            }
            if seen.contains(&row.id) {
                let idx = merged.iter().position(|c| c.id == row.id).unwrap();
                merged[idx] = Self::merge_into_existing(&merged[idx], row);
            } else {
                seen.insert(row.id.clone());
                merged.push(row);
            }
        }

        self.finish_merge(merged, has_more, total);
    }

    /// Insert or update from a single push row, applying the identity rule.
    /// Brand-new conversations go to the head of the list: a fresh activity
    /// event is always "now". Returns true when anything changed.
    pub fn upsert_from_push(&mut self, incoming: Conversation) -> bool {
        if self.tombstones.contains(&incoming.id) {
            return false;
        }

        if let Some(idx) = self.index_of(&incoming.id) {
            if !self.items[idx].accepts_stamp(incoming.stamp) {
                return false;
            }
            self.items[idx].merge_content(&incoming);
            self.sort_items();
            return true;
        }

        if let Some(participant) = incoming.participant_id.clone() {
            if let Some(idx) = self.index_of_participant(&participant) {
                // Same contact under a rotated thread id
                if identity::resolve(vec![incoming.clone(), self.items[idx].clone()])[0].id
                    == incoming.id
                {
                    let loser = self.items.remove(idx);
                    self.tombstones.insert(loser.id);
                    self.items.insert(0, incoming);
                } else {
                    self.tombstones.insert(incoming.id);
                }
                return true;
            }
        }

        self.items.insert(0, incoming);
        self.total += 1;
        true
    }

    /// Stamp-gated content merge for a single row already in the store.
    /// No-op when the id is absent or tombstoned; late push rows for
    /// not-yet-loaded conversations are dropped, not inserted.
    pub fn apply_row(&mut self, row: Conversation) -> bool {
        if self.tombstones.contains(&row.id) {
            return false;
        }
        let Some(idx) = self.index_of(&row.id) else {
            return false;
        };
        if !self.items[idx].accepts_stamp(row.stamp) {
            return false;
        }
        self.items[idx].merge_content(&row);
        self.sort_items();
        true
    }

    /// Advance a conversation's preview fields from a single message
    /// event. Stamp-gated by the message timestamp so an older message
    /// never regresses the preview; event-level dedup (by message id) is
    /// the dispatcher's job. Returns true when the preview advanced.
    pub fn apply_message_preview(&mut self, message: &Message) -> bool {
        if self.tombstones.contains(&message.conversation_id) {
            return false;
        }
        let Some(idx) = self.index_of(&message.conversation_id) else {
            return false;
        };
        if !self.items[idx].accepts_stamp(message.timestamp) {
            return false;
        }
        let conv = &mut self.items[idx];
        conv.last_message_text = Some(message.text.clone());
        conv.last_message_time = message.timestamp;
        conv.last_message_from_owner = message.is_from_owner;
        conv.stamp = message.timestamp;
        self.sort_items();
        true
    }

    /// Shallow-merge a patch into the matching conversation. No-op (not an
    /// error) when the id is absent.
    pub fn apply_patch(&mut self, id: &ConversationId, patch: &ConversationPatch) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                patch.apply(&mut self.items[idx]);
                true
            }
            None => false,
        }
    }

    pub fn increment_unread(&mut self, id: &ConversationId, delta: u32) {
        if let Some(idx) = self.index_of(id) {
            self.items[idx].unread_count = self.items[idx].unread_count.saturating_add(delta);
        }
    }

    /// Unconditionally authoritative: used when the conversation becomes
    /// the active selection.
    pub fn reset_unread(&mut self, id: &ConversationId) {
        if let Some(idx) = self.index_of(id) {
            self.items[idx].unread_count = 0;
        }
    }

    pub fn set_unread(&mut self, id: &ConversationId, count: u32) {
        if let Some(idx) = self.index_of(id) {
            self.items[idx].unread_count = count;
        }
    }

    /// Remove a conversation (optimistic delete). Deliberately not a
    /// tombstone: if the upstream delete fails, the next poll re-inserts
    /// the row and the mirror converges.
    pub fn remove(&mut self, id: &ConversationId) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.items.remove(idx);
                self.total = self.total.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    fn merge_into_existing(existing: &Conversation, row: Conversation) -> Conversation {
        let mut out = existing.clone();
        if out.accepts_stamp(row.stamp) {
            out.merge_content(&row);
        }
        // Counters are not stamp-gated; the poll snapshot is authoritative
        // except for the active selection, which the dispatcher re-zeros.
        out.unread_count = row.unread_count;
        out
    }

    fn finish_merge(&mut self, merged: Vec<Conversation>, has_more: bool, total: usize) {
        let resolution = identity::resolve_with_dropped(merged);
        for id in resolution.dropped {
            tracing::debug!(conversation = %id, "tombstoning duplicate thread id");
            self.tombstones.insert(id);
        }
        self.items = resolution.kept;
        self.sort_items();
        self.has_more = has_more;
        self.total = total;
    }

    fn sort_items(&mut self) {
        self.items
            .sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    }
}
