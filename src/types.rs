//! Internal record types for the synchronization engine
//!
//! These are the fixed shapes the engine works with. Backend-specific row
//! shapes are translated into these exactly once, at the boundary (see
//! `rows`), so nothing past the dispatcher sees backend field names.
//!
//! Timestamps are milliseconds since the Unix epoch (`i64`) throughout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{ClientId, ConversationId, MessageId, ParticipantId, TagId, UserId};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Pipeline stage of the lead behind a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Engaged,
    Qualified,
    Converted,
    Lost,
}

/// One messaging thread with one external participant, as mirrored locally.
///
/// `stamp` is the timestamp of the last applied content update; the
/// dispatcher rejects incoming content with an older-or-equal stamp so a
/// stale poll snapshot cannot regress fields a push event already advanced.
/// The stamp does not gate `unread_count`, which goes through the dedicated
/// counter operations on the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// Stable identity of the contact; the true dedup key. Rows without one
    /// are never deduplicated.
    pub participant_id: Option<ParticipantId>,
    pub participant_name: Option<String>,

    // Preview fields (content, stamp-gated)
    pub last_message_text: Option<String>,
    pub last_message_time: i64,
    pub last_message_from_owner: bool,

    pub unread_count: u32,

    pub assigned_to: Option<UserId>,
    pub linked_client_id: Option<ClientId>,
    pub tags: BTreeSet<TagId>,
    pub lead_status: LeadStatus,

    // Derived fields, written only by the analysis trigger
    pub ai_summary: Option<String>,
    pub best_time_to_contact: Option<String>,
    pub viewed_entity: Option<String>,

    /// Timestamp of the last applied content update
    pub stamp: i64,
}

impl Conversation {
    /// Whether an incoming update stamped `incoming` may overwrite content
    /// fields. Older-or-equal stamps are rejected.
    pub fn accepts_stamp(&self, incoming: i64) -> bool {
        incoming > self.stamp
    }

    /// Overwrite content fields from `other`, keeping derived AI fields
    /// (those belong to the analysis trigger) and `unread_count` (counter
    /// ops only). Callers check `accepts_stamp` first.
    pub fn merge_content(&mut self, other: &Conversation) {
        self.participant_id = other.participant_id.clone();
        self.participant_name = other.participant_name.clone();
        self.last_message_text = other.last_message_text.clone();
        self.last_message_time = other.last_message_time;
        self.last_message_from_owner = other.last_message_from_owner;
        self.assigned_to = other.assigned_to.clone();
        self.linked_client_id = other.linked_client_id.clone();
        self.tags = other.tags.clone();
        self.lead_status = other.lead_status;
        self.stamp = other.stamp;
    }
}

/// One inbound or outbound event inside a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub is_from_owner: bool,
    pub text: String,
    /// Opaque attachment payloads, order preserved
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    pub timestamp: i64,
}

/// Partial update for a conversation. `None` leaves a field untouched;
/// nullable fields use a nested `Option` so they can be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_client_id: Option<Option<ClientId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<TagId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_time_to_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_entity: Option<String>,
}

impl ConversationPatch {
    pub fn assign(user: Option<UserId>) -> Self {
        Self { assigned_to: Some(user), ..Default::default() }
    }

    pub fn link_client(client: Option<ClientId>) -> Self {
        Self { linked_client_id: Some(client), ..Default::default() }
    }

    pub fn tags(tags: BTreeSet<TagId>) -> Self {
        Self { tags: Some(tags), ..Default::default() }
    }

    pub fn lead_status(status: LeadStatus) -> Self {
        Self { lead_status: Some(status), ..Default::default() }
    }

    /// Build a patch carrying an analysis result's derived fields.
    pub fn from_analysis(result: &AnalysisResult) -> Self {
        Self {
            ai_summary: result.summary.clone(),
            best_time_to_contact: result.best_time_to_contact.clone(),
            viewed_entity: result.viewed_entity.clone(),
            ..Default::default()
        }
    }

    /// Shallow-merge the set fields into `conversation`.
    pub fn apply(&self, conversation: &mut Conversation) {
        if let Some(assigned) = &self.assigned_to {
            conversation.assigned_to = assigned.clone();
        }
        if let Some(linked) = &self.linked_client_id {
            conversation.linked_client_id = linked.clone();
        }
        if let Some(tags) = &self.tags {
            conversation.tags = tags.clone();
        }
        if let Some(status) = self.lead_status {
            conversation.lead_status = status;
        }
        if let Some(summary) = &self.ai_summary {
            conversation.ai_summary = Some(summary.clone());
        }
        if let Some(best_time) = &self.best_time_to_contact {
            conversation.best_time_to_contact = Some(best_time.clone());
        }
        if let Some(entity) = &self.viewed_entity {
            conversation.viewed_entity = Some(entity.clone());
        }
    }
}

/// Result returned by the analysis collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: Option<String>,
    pub best_time_to_contact: Option<String>,
    pub viewed_entity: Option<String>,
}
