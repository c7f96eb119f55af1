//! Per-conversation bidirectional message cache
//!
//! A window exists only while its conversation is the active selection;
//! switching selection discards the window outright (the dispatcher holds
//! `Option<MessageWindow>`, and `None` is the `Empty` state). In-flight
//! fetches for a discarded window are never applied: the dispatcher checks
//! the generation token (the currently selected conversation id) before
//! calling any `apply_*` method here.
//!
//! Invariant: messages are strictly ordered by timestamp ascending with no
//! duplicate ids.

use crate::ids::{ConversationId, MessageId};
use crate::types::Message;

/// Lifecycle of a live window. `Empty` is represented by the absence of a
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Initial fetch in flight
    Loading,
    Ready,
    /// Older-history fetch in flight; the current messages stay visible
    LoadingOlder,
}

#[derive(Debug)]
pub struct MessageWindow {
    conversation_id: ConversationId,
    state: WindowState,
    messages: Vec<Message>,
    has_older: bool,
    /// High-water mark: how many trailing messages a silent refresh keeps.
    /// Grows as older history is paged in so a refresh does not shrink the
    /// window back to its initial size.
    limit: usize,
}

impl MessageWindow {
    pub fn open(conversation_id: ConversationId, limit: usize) -> Self {
        Self {
            conversation_id,
            state: WindowState::Loading,
            messages: Vec::new(),
            has_older: false,
            limit,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_older(&self) -> bool {
        self.has_older
    }

    /// Trailing-fetch size for the next silent refresh.
    pub fn refresh_limit(&self) -> usize {
        self.limit.max(self.messages.len())
    }

    pub fn is_ready(&self) -> bool {
        self.state == WindowState::Ready
    }

    /// Apply the initial fetch result. `fetch_limit` is the limit the fetch
    /// was issued with; a full page means more history exists upstream.
    pub fn apply_initial(&mut self, messages: Vec<Message>, fetch_limit: usize) {
        self.has_older = messages.len() == fetch_limit;
        self.messages = Self::normalized(messages);
        self.state = WindowState::Ready;
    }

    /// Transition to `LoadingOlder` and return the timestamp to page before.
    /// No-op (returns `None`) when no older history exists or a fetch is
    /// already in flight.
    pub fn begin_load_older(&mut self) -> Option<i64> {
        if self.state != WindowState::Ready || !self.has_older {
            return None;
        }
        let earliest = self.messages.first().map(|m| m.timestamp)?;
        self.state = WindowState::LoadingOlder;
        Some(earliest)
    }

    /// Prepend an older-history batch fetched with `fetch_limit`.
    pub fn apply_older(&mut self, older: Vec<Message>, fetch_limit: usize) {
        self.has_older = older.len() == fetch_limit;
        let mut combined = older;
        combined.extend(std::mem::take(&mut self.messages));
        self.messages = Self::normalized(combined);
        self.limit = self.limit.max(self.messages.len());
        self.state = WindowState::Ready;
    }

    /// Return to `Ready` after a failed older-history fetch.
    pub fn abort_load_older(&mut self) {
        if self.state == WindowState::LoadingOlder {
            self.state = WindowState::Ready;
        }
    }

    /// Wholesale replace from a silent trailing re-fetch. The trailing
    /// window is small, so a full replace is simpler than a merge and
    /// self-correcting.
    ///
    /// A full fetch normally means more history exists, but when the
    /// refresh comes back with the same oldest message the earlier
    /// knowledge stands: paging that already hit the beginning of history
    /// must not re-arm `has_older`.
    pub fn apply_refresh(&mut self, messages: Vec<Message>, fetch_limit: usize) {
        let refreshed = Self::normalized(messages);
        let full = refreshed.len() == fetch_limit;
        let same_oldest =
            refreshed.first().map(|m| &m.id) == self.messages.first().map(|m| &m.id);
        self.has_older = full && (self.has_older || !same_oldest);
        self.messages = refreshed;
        if self.state == WindowState::Loading {
            self.state = WindowState::Ready;
        }
    }

    /// Insert a locally known message (optimistic send, or a push-delivered
    /// message for this conversation). Duplicate ids and messages for other
    /// conversations are rejected silently. Returns true when inserted.
    pub fn append_local(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let idx = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(idx, message);
        true
    }

    /// Remove a message by id (used to swap an optimistic send for the
    /// persisted row). Returns true when something was removed.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        self.messages.len() != before
    }

    /// Sort ascending by timestamp and drop duplicate ids (first wins).
    fn normalized(mut messages: Vec<Message>) -> Vec<Message> {
        messages.sort_by_key(|m| m.timestamp);
        let mut seen = std::collections::HashSet::new();
        messages.retain(|m| seen.insert(m.id.clone()));
        messages
    }
}
