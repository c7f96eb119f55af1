//! Wire row shapes for the persistence collaborator
//!
//! The hosted data store speaks loosely-shaped camelCase rows. This module
//! is the single translation point: rows come in, internal records go out.
//! The rest of the engine never sees backend field names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{ClientId, ConversationId, MessageId, ParticipantId, TagId, UserId};
use crate::types::{Conversation, LeadStatus, Message};

/// One conversation row as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    pub conversation_id: String,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub last_message_time: i64,
    #[serde(default)]
    pub last_message_from_owner: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub linked_client_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lead_status: Option<LeadStatus>,
}

impl ConversationRow {
    /// Translate into the internal record. The row's `lastMessageTime`
    /// doubles as the initial content stamp; derived AI fields start empty
    /// (polling and push never carry them).
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: ConversationId::from_string(self.conversation_id),
            participant_id: self.participant_id.map(ParticipantId::from_string),
            participant_name: self.participant_name,
            last_message_text: self.last_message_text,
            last_message_time: self.last_message_time,
            last_message_from_owner: self.last_message_from_owner,
            unread_count: self.unread_count,
            assigned_to: self.assigned_to.map(UserId::from_string),
            linked_client_id: self.linked_client_id.map(ClientId::from_string),
            tags: self
                .tags
                .into_iter()
                .map(TagId::from_string)
                .collect::<BTreeSet<_>>(),
            lead_status: self.lead_status.unwrap_or_default(),
            ai_summary: None,
            best_time_to_contact: None,
            viewed_entity: None,
            stamp: self.last_message_time,
        }
    }
}

/// One message row as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub is_from_owner: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: i64,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: MessageId::from_string(self.id),
            conversation_id: ConversationId::from_string(self.conversation_id),
            is_from_owner: self.is_from_owner,
            text: self.text,
            attachments: self.attachments,
            timestamp: self.timestamp,
        }
    }
}

/// One page of conversation rows, with the backend's paging metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPage {
    pub rows: Vec<ConversationRow>,
    pub has_more: bool,
    pub total: usize,
}

/// Translate a batch of message rows, dropping none.
pub fn messages_from_rows(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter().map(MessageRow::into_message).collect()
}

/// Translate a batch of conversation rows.
pub fn conversations_from_rows(rows: Vec<ConversationRow>) -> Vec<Conversation> {
    rows.into_iter()
        .map(ConversationRow::into_conversation)
        .collect()
}
