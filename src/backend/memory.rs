//! In-memory collaborators for tests and local development
//!
//! `MemoryBackend` implements [`InboxBackend`] over a plain `Mutex`-guarded
//! map, the way the engine's tests want to script it: rows can be seeded or
//! mutated between engine calls, sends can be forced to fail, and thread
//! fetches can be held open to exercise selection races deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::backend::{InboxBackend, MessageAnalyzer};
use crate::error::SyncError;
use crate::ids::{ConversationId, ParticipantId};
use crate::rows::{ConversationPage, ConversationRow, MessageRow};
use crate::types::{now_millis, AnalysisResult, ConversationPatch, Message};

#[derive(Default)]
struct Inner {
    conversations: Vec<ConversationRow>,
    /// conversation id -> messages sorted ascending by timestamp
    messages: HashMap<String, Vec<MessageRow>>,
    mark_read_calls: Vec<ConversationId>,
    patches: Vec<(ConversationId, ConversationPatch)>,
    deleted: Vec<ConversationId>,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    /// Gates for holding `fetch_messages` open, per conversation
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    fail_next_send: AtomicBool,
    next_server_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_conversation(&self, row: ConversationRow) {
        let mut inner = self.inner.lock().unwrap();
        inner.conversations.retain(|c| c.conversation_id != row.conversation_id);
        inner.conversations.push(row);
    }

    pub fn seed_message(&self, row: MessageRow) {
        let mut inner = self.inner.lock().unwrap();
        let list = inner
            .messages
            .entry(row.conversation_id.clone())
            .or_default();
        list.push(row);
        list.sort_by_key(|m| m.timestamp);
    }

    /// Replace the whole conversation table (scripting a poll snapshot).
    pub fn set_conversations(&self, rows: Vec<ConversationRow>) {
        self.inner.lock().unwrap().conversations = rows;
    }

    /// Hold all `fetch_messages` calls for `id` until released.
    pub fn hold_thread_fetches(&self, id: &ConversationId) {
        self.gates
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Release held `fetch_messages` calls for `id`.
    pub fn release_thread_fetches(&self, id: &ConversationId) {
        if let Some(gate) = self.gates.lock().unwrap().remove(id.as_str()) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Make the next `send_message` fail with a conflict.
    pub fn fail_next_send(&self) {
        self.fail_next_send.store(true, Ordering::SeqCst);
    }

    pub fn mark_read_calls(&self) -> Vec<ConversationId> {
        self.inner.lock().unwrap().mark_read_calls.clone()
    }

    pub fn recorded_patches(&self) -> Vec<(ConversationId, ConversationPatch)> {
        self.inner.lock().unwrap().patches.clone()
    }

    pub fn deleted_conversations(&self) -> Vec<ConversationId> {
        self.inner.lock().unwrap().deleted.clone()
    }

    fn gate_for(&self, id: &str) -> Option<Arc<Semaphore>> {
        self.gates.lock().unwrap().get(id).cloned()
    }

    async fn wait_gate(&self, id: &str) {
        if let Some(gate) = self.gate_for(id) {
            // permit intentionally forgotten; release_thread_fetches refills
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn sorted_conversations(inner: &Inner) -> Vec<ConversationRow> {
        let mut rows = inner.conversations.clone();
        rows.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        rows
    }
}

#[async_trait]
impl InboxBackend for MemoryBackend {
    async fn fetch_conversation_page(
        &self,
        _filter: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<ConversationPage, SyncError> {
        let inner = self.inner.lock().unwrap();
        let rows = Self::sorted_conversations(&inner);
        let total = rows.len();
        let start = page.saturating_sub(1) * page_size;
        let slice: Vec<ConversationRow> = rows.into_iter().skip(start).take(page_size).collect();
        let has_more = start + slice.len() < total;
        Ok(ConversationPage { rows: slice, has_more, total })
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, SyncError> {
        self.wait_gate(conversation_id.as_str()).await;
        let inner = self.inner.lock().unwrap();
        let all = inner
            .messages
            .get(conversation_id.as_str())
            .cloned()
            .unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn fetch_messages_before(
        &self,
        conversation_id: &ConversationId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<MessageRow>, SyncError> {
        let inner = self.inner.lock().unwrap();
        let older: Vec<MessageRow> = inner
            .messages
            .get(conversation_id.as_str())
            .map(|all| {
                all.iter()
                    .filter(|m| m.timestamp < before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let skip = older.len().saturating_sub(limit);
        Ok(older.into_iter().skip(skip).collect())
    }

    async fn fetch_latest_previews(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<ConversationRow>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversations
            .iter()
            .filter(|c| {
                conversation_ids
                    .iter()
                    .any(|id| id.as_str() == c.conversation_id)
            })
            .cloned()
            .collect())
    }

    async fn fetch_unread_counts(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<(ConversationId, u32)>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversations
            .iter()
            .filter(|c| {
                conversation_ids
                    .iter()
                    .any(|id| id.as_str() == c.conversation_id)
            })
            .map(|c| {
                (
                    ConversationId::from_string(c.conversation_id.clone()),
                    c.unread_count,
                )
            })
            .collect())
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id.as_str())
        {
            row.unread_count = 0;
        }
        inner.mark_read_calls.push(conversation_id.clone());
        Ok(())
    }

    async fn mutate_conversation(
        &self,
        conversation_id: &ConversationId,
        patch: &ConversationPatch,
    ) -> Result<(), SyncError> {
        self.inner
            .lock()
            .unwrap()
            .patches
            .push((conversation_id.clone(), patch.clone()));
        Ok(())
    }

    async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .conversations
            .retain(|c| c.conversation_id != conversation_id.as_str());
        inner.messages.remove(conversation_id.as_str());
        inner.deleted.push(conversation_id.clone());
        Ok(())
    }

    async fn send_message(
        &self,
        participant_id: &ParticipantId,
        text: &str,
    ) -> Result<MessageRow, SyncError> {
        if self.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(SyncError::conflict("send rejected"));
        }
        let mut inner = self.inner.lock().unwrap();
        let conversation_id = inner
            .conversations
            .iter()
            .find(|c| c.participant_id.as_deref() == Some(participant_id.as_str()))
            .map(|c| c.conversation_id.clone())
            .ok_or_else(|| SyncError::conflict("unknown participant"))?;

        let n = self.next_server_id.fetch_add(1, Ordering::SeqCst);
        let row = MessageRow {
            id: format!("srv-{}", n),
            conversation_id: conversation_id.clone(),
            is_from_owner: true,
            text: text.to_string(),
            attachments: Vec::new(),
            timestamp: now_millis(),
        };
        inner
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(row.clone());
        if let Some(conv) = inner
            .conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id)
        {
            conv.last_message_text = Some(row.text.clone());
            conv.last_message_time = row.timestamp;
            conv.last_message_from_owner = true;
        }
        Ok(row)
    }
}

/// Scripted analysis collaborator: returns queued results (or a default),
/// counts calls, and can be told to fail.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    results: Mutex<Vec<AnalysisResult>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_result(&self, result: AnalysisResult) {
        self.results.lock().unwrap().push(result);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        messages: &[Message],
        participant_name: &str,
    ) -> Result<AnalysisResult, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::analysis("analyzer unavailable"));
        }
        let queued = {
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                None
            } else {
                Some(results.remove(0))
            }
        };
        Ok(queued.unwrap_or_else(|| AnalysisResult {
            summary: Some(format!(
                "{} messages with {}",
                messages.len(),
                participant_name
            )),
            best_time_to_contact: None,
            viewed_entity: None,
        }))
    }
}
