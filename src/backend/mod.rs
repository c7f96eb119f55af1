//! Collaborator contracts consumed by the engine
//!
//! The engine drives three external collaborators: the persistence store
//! behind [`InboxBackend`], the realtime change channel (a [`PushStream`]
//! of [`PushEvent`]s), and the text-analysis service behind
//! [`MessageAnalyzer`]. Their internals are out of scope here; only these
//! contracts matter.

pub mod memory;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::SyncError;
use crate::ids::{ConversationId, ParticipantId};
use crate::rows::{ConversationPage, ConversationRow, MessageRow};
use crate::types::{AnalysisResult, ConversationPatch, Message};

/// Persistence collaborator: the hosted data store the mirror reflects.
#[async_trait]
pub trait InboxBackend: Send + Sync {
    /// Fetch one page of conversation summaries. `filter` is an opaque
    /// page filter (e.g. an inbox segment id); `page` is 1-based.
    async fn fetch_conversation_page(
        &self,
        filter: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<ConversationPage, SyncError>;

    /// Fetch the most recent `limit` messages of a conversation.
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, SyncError>;

    /// Fetch up to `limit` messages strictly older than `before`.
    async fn fetch_messages_before(
        &self,
        conversation_id: &ConversationId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<MessageRow>, SyncError>;

    /// Fetch fresh preview rows for already-known conversations (used by
    /// the list poll for pages beyond the first).
    async fn fetch_latest_previews(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<ConversationRow>, SyncError>;

    /// Fetch fresh unread counters for already-known conversations.
    async fn fetch_unread_counts(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<(ConversationId, u32)>, SyncError>;

    /// Mark a conversation read upstream. Idempotent.
    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<(), SyncError>;

    /// Persist a partial conversation update.
    async fn mutate_conversation(
        &self,
        conversation_id: &ConversationId,
        patch: &ConversationPatch,
    ) -> Result<(), SyncError>;

    /// Delete a conversation upstream.
    async fn delete_conversation(&self, conversation_id: &ConversationId)
        -> Result<(), SyncError>;

    /// Send a message to a participant; returns the persisted row.
    async fn send_message(
        &self,
        participant_id: &ParticipantId,
        text: &str,
    ) -> Result<MessageRow, SyncError>;
}

/// Analysis collaborator. May fail or time out; the engine logs and skips.
#[async_trait]
pub trait MessageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        messages: &[Message],
        participant_name: &str,
    ) -> Result<AnalysisResult, SyncError>;
}

/// One asynchronous change notification from the realtime channel.
/// Delivery is at-least-once and unordered across conversations.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// A new message landed in some conversation
    Message(MessageRow),
    /// A conversation row changed (or a brand-new one appeared)
    Conversation(ConversationRow),
}

/// The realtime subscription the engine consumes.
pub type PushStream = Pin<Box<dyn Stream<Item = PushEvent> + Send>>;
