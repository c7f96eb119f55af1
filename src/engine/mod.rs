//! SyncEngine - the reconciliation dispatcher and its public handle
//!
//! Three producers feed one serialized consumer: the refresh scheduler's
//! poll timers, the realtime push subscription, and the user's optimistic
//! local actions. All of them enter the same command mailbox; a background
//! task owns the stores and applies every mutation in arrival order, so the
//! stores never see concurrent access.
//!
//! I/O never blocks the mailbox: fetches run in spawned tasks and re-enter
//! the loop as completion commands carrying enough context (conversation
//! id, page number, silent flag) for the loop to decide whether the result
//! is still wanted. Switching the active conversation makes any in-flight
//! result for the old one stale; staleness is checked at apply time against
//! the currently selected conversation id, never by cancelling the fetch.
//!
//! Local actions apply to the mirror before the backend confirms. On
//! failure the engine emits [`EngineEvent::Error`] and does not roll back;
//! the next poll converges the mirror.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalysisTracker;
use crate::backend::{InboxBackend, MessageAnalyzer, PushEvent, PushStream};
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::ids::{ClientId, ConversationId, MessageId, TagId, UserId};
use crate::rows::{
    conversations_from_rows, messages_from_rows, ConversationPage, ConversationRow, MessageRow,
};
use crate::scheduler;
use crate::store::ConversationStore;
use crate::types::{
    now_millis, AnalysisResult, Conversation, ConversationPatch, LeadStatus, Message,
};
use crate::window::{MessageWindow, WindowState};

// ============================================================================
// Snapshots (presentation interface, read-only)
// ============================================================================

/// Lock-free read model of the engine. Published through a `watch` channel
/// after every applied mutation; the UI clones it and never blocks the
/// dispatcher.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub conversations: Vec<Conversation>,
    pub total: usize,
    pub has_more: bool,
    /// True only for user-visible list loads, never for silent polls
    pub list_loading: bool,
    pub selected: Option<ConversationId>,
    pub window: Option<WindowSnapshot>,
}

/// Read model of the active message window.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub has_older: bool,
    /// Initial fetch in flight (user-visible)
    pub loading: bool,
    /// Older-history fetch in flight (user-visible)
    pub loading_older: bool,
}

// ============================================================================
// Commands and Events
// ============================================================================

/// Commands entering the mailbox. Presentation calls, producer feeds, and
/// internal I/O completions all go through here.
pub(crate) enum EngineCommand {
    // Presentation
    Select(Option<ConversationId>),
    Send(String),
    LoadMore,
    LoadOlder,
    MarkRead,
    Mutate(ConversationId, ConversationPatch),
    Delete(ConversationId),

    // Producers
    Push(PushEvent),
    PollList,
    PollThread,

    // I/O completions
    PageLoaded {
        page: usize,
        silent: bool,
        result: Result<ConversationPage, SyncError>,
    },
    PreviewsLoaded {
        result: Result<(Vec<ConversationRow>, Vec<(ConversationId, u32)>), SyncError>,
    },
    ThreadLoaded {
        conversation_id: ConversationId,
        fetch_limit: usize,
        silent: bool,
        result: Result<Vec<MessageRow>, SyncError>,
    },
    OlderLoaded {
        conversation_id: ConversationId,
        fetch_limit: usize,
        result: Result<Vec<MessageRow>, SyncError>,
    },
    SendFinished {
        conversation_id: ConversationId,
        local_id: MessageId,
        result: Result<MessageRow, SyncError>,
    },
    ActionFinished {
        conversation_id: ConversationId,
        action: &'static str,
        result: Result<(), SyncError>,
    },
    AnalysisFinished {
        conversation_id: ConversationId,
        result: Result<AnalysisResult, SyncError>,
    },
}

/// Events emitted alongside the snapshot stream.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An optimistic send was confirmed; carries the persisted message
    MessageSent(Message),
    /// A fresh analysis result was patched into the conversation
    AnalysisCompleted(ConversationId),
    /// A producer failed; other producers keep running
    Error(SyncError),
}

// ============================================================================
// SyncEngine (public handle)
// ============================================================================

/// Handle to the synchronization engine.
///
/// Constructed once per process at startup and passed by reference to the
/// presentation layer; lives until [`SyncEngine::shutdown`] or drop.
pub struct SyncEngine {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
    cancel: CancellationToken,
    #[allow(dead_code)]
    task_handle: JoinHandle<()>,
}

impl SyncEngine {
    /// Spawn the dispatcher, the push forwarder, and the refresh scheduler,
    /// and issue the initial (non-silent) page load.
    pub fn new(
        backend: Arc<dyn InboxBackend>,
        analyzer: Arc<dyn MessageAnalyzer>,
        push: PushStream,
        config: EngineConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());
        let (selection_tx, selection_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        scheduler::spawn(cmd_tx.clone(), &config, selection_rx, cancel.child_token());
        Self::spawn_push_forwarder(cmd_tx.clone(), push, cancel.child_token());

        let dispatcher = Dispatcher {
            backend,
            analyzer,
            config,
            cmd_tx: cmd_tx.clone(),
            event_tx,
            snapshot_tx,
            selection_tx,
            store: ConversationStore::new(),
            window: None,
            selected: None,
            analysis: AnalysisTracker::new(),
            seen_push_ids: HashSet::new(),
            list_loading: false,
            pages_loaded: 0,
        };
        let task_handle = tokio::spawn(dispatcher.run(cmd_rx));

        // Initial load: with no pages loaded yet this fetches page 1
        // non-silently and replaces the empty store.
        let _ = cmd_tx.send(EngineCommand::LoadMore);

        Self {
            cmd_tx,
            event_rx,
            snapshot_rx,
            cancel,
            task_handle,
        }
    }

    fn spawn_push_forwarder(
        cmd_tx: mpsc::UnboundedSender<EngineCommand>,
        mut push: PushStream,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = push.next() => match event {
                        Some(event) => {
                            if cmd_tx.send(EngineCommand::Push(event)).is_err() {
                                break;
                            }
                        }
                        None => {
                            tracing::warn!("push subscription ended");
                            break;
                        }
                    },
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Presentation calls
    // ------------------------------------------------------------------

    pub fn select_conversation(&self, id: Option<ConversationId>) {
        let _ = self.cmd_tx.send(EngineCommand::Select(id));
    }

    /// Send a message to the active conversation's participant. Applied
    /// optimistically; confirmation arrives as [`EngineEvent::MessageSent`].
    pub fn send_message(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(EngineCommand::Send(text.into()));
    }

    pub fn load_more_conversations(&self) {
        let _ = self.cmd_tx.send(EngineCommand::LoadMore);
    }

    pub fn load_older_messages(&self) {
        let _ = self.cmd_tx.send(EngineCommand::LoadOlder);
    }

    pub fn mark_current_read(&self) {
        let _ = self.cmd_tx.send(EngineCommand::MarkRead);
    }

    pub fn assign(&self, id: ConversationId, user: Option<UserId>) {
        self.mutate(id, ConversationPatch::assign(user));
    }

    pub fn set_tags(&self, id: ConversationId, tags: std::collections::BTreeSet<TagId>) {
        self.mutate(id, ConversationPatch::tags(tags));
    }

    pub fn link_client(&self, id: ConversationId, client: Option<ClientId>) {
        self.mutate(id, ConversationPatch::link_client(client));
    }

    pub fn set_lead_status(&self, id: ConversationId, status: LeadStatus) {
        self.mutate(id, ConversationPatch::lead_status(status));
    }

    fn mutate(&self, id: ConversationId, patch: ConversationPatch) {
        let _ = self.cmd_tx.send(EngineCommand::Mutate(id, patch));
    }

    pub fn delete_conversation(&self, id: ConversationId) {
        let _ = self.cmd_tx.send(EngineCommand::Delete(id));
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current read model (cheap clone of the latest published snapshot).
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    /// Stop the poll timers and the push subscription. The mirror is a
    /// disposable cache of the backing store; no teardown beyond this.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Dispatcher (background task)
// ============================================================================

struct Dispatcher {
    backend: Arc<dyn InboxBackend>,
    analyzer: Arc<dyn MessageAnalyzer>,
    config: EngineConfig,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    selection_tx: watch::Sender<Option<ConversationId>>,
    store: ConversationStore,
    window: Option<MessageWindow>,
    selected: Option<ConversationId>,
    analysis: AnalysisTracker,
    /// Message ids already applied from push; at-least-once delivery means
    /// the same event can arrive again
    seen_push_ids: HashSet<MessageId>,
    list_loading: bool,
    /// Highest page number loaded through user-visible pagination
    pages_loaded: usize,
}

impl Dispatcher {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            self.handle(cmd);
            self.publish();
        }
    }

    /// Apply one command. Synchronous on purpose: anything that needs I/O
    /// spawns a task and re-enters the mailbox with a completion command.
    fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Select(id) => self.handle_select(id),
            EngineCommand::Send(text) => self.handle_send(text),
            EngineCommand::LoadMore => self.handle_load_more(),
            EngineCommand::LoadOlder => self.handle_load_older(),
            EngineCommand::MarkRead => self.handle_mark_read(),
            EngineCommand::Mutate(id, patch) => self.handle_mutate(id, patch),
            EngineCommand::Delete(id) => self.handle_delete(id),
            EngineCommand::Push(event) => self.handle_push(event),
            EngineCommand::PollList => self.handle_poll_list(),
            EngineCommand::PollThread => self.handle_poll_thread(),
            EngineCommand::PageLoaded { page, silent, result } => {
                self.handle_page_loaded(page, silent, result)
            }
            EngineCommand::PreviewsLoaded { result } => self.handle_previews_loaded(result),
            EngineCommand::ThreadLoaded { conversation_id, fetch_limit, silent, result } => {
                self.handle_thread_loaded(conversation_id, fetch_limit, silent, result)
            }
            EngineCommand::OlderLoaded { conversation_id, fetch_limit, result } => {
                self.handle_older_loaded(conversation_id, fetch_limit, result)
            }
            EngineCommand::SendFinished { conversation_id, local_id, result } => {
                self.handle_send_finished(conversation_id, local_id, result)
            }
            EngineCommand::ActionFinished { conversation_id, action, result } => {
                self.handle_action_finished(conversation_id, action, result)
            }
            EngineCommand::AnalysisFinished { conversation_id, result } => {
                self.handle_analysis_finished(conversation_id, result)
            }
        }
    }

    // ------------------------------------------------------------------
    // Selection and window
    // ------------------------------------------------------------------

    fn handle_select(&mut self, id: Option<ConversationId>) {
        // Discard the previous window outright; any in-flight fetch for it
        // becomes stale and is dropped at apply time.
        self.window = None;
        self.selected = id.clone();
        let _ = self.selection_tx.send(id.clone());

        let Some(id) = id else {
            return;
        };

        // Opening a thread is reading it.
        self.store.reset_unread(&id);
        self.spawn_mark_read(id.clone());

        let limit = self.config.window_limit;
        self.window = Some(MessageWindow::open(id.clone(), limit));

        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_messages(&id, limit).await;
            let _ = cmd_tx.send(EngineCommand::ThreadLoaded {
                conversation_id: id,
                fetch_limit: limit,
                silent: false,
                result,
            });
        });
    }

    fn handle_thread_loaded(
        &mut self,
        conversation_id: ConversationId,
        fetch_limit: usize,
        silent: bool,
        result: Result<Vec<MessageRow>, SyncError>,
    ) {
        if self.selected.as_ref() != Some(&conversation_id) {
            tracing::debug!(conversation = %conversation_id, "dropping stale thread fetch");
            return;
        }
        let Some(window) = self.window.as_mut() else {
            return;
        };
        match result {
            Ok(rows) => {
                let messages = messages_from_rows(rows);
                if silent {
                    window.apply_refresh(messages, fetch_limit);
                } else {
                    window.apply_initial(messages, fetch_limit);
                }
                self.maybe_trigger_analysis();
            }
            Err(e) if silent => {
                // Scheduler retries on its next tick; never a tight loop.
                tracing::warn!(conversation = %conversation_id, error = %e, "silent thread refresh failed");
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, error = %e, "thread open failed");
                self.window = None;
                let _ = self.event_tx.send(EngineEvent::Error(e));
            }
        }
    }

    fn handle_load_older(&mut self) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let Some(before) = window.begin_load_older() else {
            return;
        };
        let id = window.conversation_id().clone();
        let limit = self.config.older_batch;
        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_messages_before(&id, before, limit).await;
            let _ = cmd_tx.send(EngineCommand::OlderLoaded {
                conversation_id: id,
                fetch_limit: limit,
                result,
            });
        });
    }

    fn handle_older_loaded(
        &mut self,
        conversation_id: ConversationId,
        fetch_limit: usize,
        result: Result<Vec<MessageRow>, SyncError>,
    ) {
        if self.selected.as_ref() != Some(&conversation_id) {
            tracing::debug!(conversation = %conversation_id, "dropping stale older-history fetch");
            return;
        }
        let Some(window) = self.window.as_mut() else {
            return;
        };
        match result {
            Ok(rows) => {
                window.apply_older(messages_from_rows(rows), fetch_limit);
                self.maybe_trigger_analysis();
            }
            Err(e) => {
                window.abort_load_older();
                let _ = self.event_tx.send(EngineEvent::Error(e));
            }
        }
    }

    // ------------------------------------------------------------------
    // List loading
    // ------------------------------------------------------------------

    fn handle_load_more(&mut self) {
        if self.list_loading {
            return;
        }
        if self.pages_loaded > 0 && !self.store.has_more() {
            return;
        }
        let page = self.pages_loaded + 1;
        self.list_loading = true;
        self.spawn_page_fetch(page, false);
    }

    fn handle_poll_list(&mut self) {
        self.spawn_page_fetch(1, true);

        // Deep pages are not re-paged; refresh their previews and counters
        // with the lightweight endpoints instead.
        let deep: Vec<ConversationId> = self
            .store
            .items()
            .iter()
            .skip(self.config.page_size)
            .map(|c| c.id.clone())
            .collect();
        if deep.is_empty() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let previews = backend.fetch_latest_previews(&deep).await?;
                let unread = backend.fetch_unread_counts(&deep).await?;
                Ok((previews, unread))
            }
            .await;
            let _ = cmd_tx.send(EngineCommand::PreviewsLoaded { result });
        });
    }

    fn spawn_page_fetch(&self, page: usize, silent: bool) {
        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        let page_size = self.config.page_size;
        tokio::spawn(async move {
            let result = backend.fetch_conversation_page(None, page, page_size).await;
            let _ = cmd_tx.send(EngineCommand::PageLoaded { page, silent, result });
        });
    }

    fn handle_page_loaded(
        &mut self,
        page: usize,
        silent: bool,
        result: Result<ConversationPage, SyncError>,
    ) {
        let page_result = match result {
            Ok(p) => p,
            Err(e) if silent => {
                tracing::warn!(error = %e, "silent list poll failed");
                return;
            }
            Err(e) => {
                // Failed load leaves the store untouched.
                self.list_loading = false;
                let _ = self.event_tx.send(EngineEvent::Error(e));
                return;
            }
        };

        let rows = conversations_from_rows(page_result.rows);
        if silent {
            // A silent page-1 poll replaces the first-page span (so upstream
            // deletions converge) but keeps pages the user has scrolled into.
            self.store.refresh_first_page(
                rows,
                page_result.has_more,
                page_result.total,
                self.config.page_size,
            );
        } else if page == 1 {
            self.store
                .replace_page(rows, page_result.has_more, page_result.total);
            self.pages_loaded = 1;
            self.list_loading = false;
        } else {
            self.store
                .append_page(rows, page_result.has_more, page_result.total);
            self.pages_loaded = page;
            self.list_loading = false;
        }

        // A message arriving for the open thread is immediately read.
        if let Some(selected) = self.selected.clone() {
            self.store.reset_unread(&selected);
        }
    }

    fn handle_previews_loaded(
        &mut self,
        result: Result<(Vec<ConversationRow>, Vec<(ConversationId, u32)>), SyncError>,
    ) {
        let (previews, unread) = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "preview refresh failed");
                return;
            }
        };
        for row in previews {
            self.store.apply_row(row.into_conversation());
        }
        for (id, count) in unread {
            if self.selected.as_ref() == Some(&id) {
                continue;
            }
            self.store.set_unread(&id, count);
        }
        if let Some(selected) = self.selected.clone() {
            self.store.reset_unread(&selected);
        }
    }

    fn handle_poll_thread(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        // Skip while another window fetch is in flight; the next tick
        // catches up.
        if window.state() != WindowState::Ready {
            return;
        }
        let id = window.conversation_id().clone();
        let limit = window.refresh_limit();
        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_messages(&id, limit).await;
            let _ = cmd_tx.send(EngineCommand::ThreadLoaded {
                conversation_id: id,
                fetch_limit: limit,
                silent: true,
                result,
            });
        });
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Message(row) => {
                let message = row.into_message();
                let id = message.conversation_id.clone();
                if self.store.is_tombstoned(&id) {
                    return;
                }

                // Idempotence is keyed on the message id; two distinct
                // messages in the same millisecond are still two messages.
                if !self.seen_push_ids.insert(message.id.clone()) {
                    return;
                }

                // The stamp gate inside protects content only: an older
                // message never regresses the preview.
                self.store.apply_message_preview(&message);

                if self.selected.as_ref() == Some(&id) {
                    if let Some(window) = self.window.as_mut() {
                        window.append_local(message);
                    }
                    self.store.reset_unread(&id);
                    self.maybe_trigger_analysis();
                } else {
                    self.store.increment_unread(&id, 1);
                }
            }
            PushEvent::Conversation(row) => {
                self.store.upsert_from_push(row.into_conversation());
                if let Some(selected) = self.selected.clone() {
                    self.store.reset_unread(&selected);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Local actions (optimistic)
    // ------------------------------------------------------------------

    fn handle_send(&mut self, text: String) {
        let Some(selected) = self.selected.clone() else {
            let _ = self
                .event_tx
                .send(EngineEvent::Error(SyncError::conflict("no active conversation")));
            return;
        };
        let Some(participant) = self
            .store
            .get(&selected)
            .and_then(|c| c.participant_id.clone())
        else {
            let _ = self.event_tx.send(EngineEvent::Error(SyncError::conflict(
                "active conversation has no participant",
            )));
            return;
        };

        let local = Message {
            id: MessageId::new(),
            conversation_id: selected.clone(),
            is_from_owner: true,
            text: text.clone(),
            attachments: Vec::new(),
            timestamp: now_millis(),
        };
        if let Some(window) = self.window.as_mut() {
            window.append_local(local.clone());
        }
        self.store.apply_message_preview(&local);
        self.maybe_trigger_analysis();

        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        let local_id = local.id;
        tokio::spawn(async move {
            let result = backend.send_message(&participant, &text).await;
            let _ = cmd_tx.send(EngineCommand::SendFinished {
                conversation_id: selected,
                local_id,
                result,
            });
        });
    }

    fn handle_send_finished(
        &mut self,
        conversation_id: ConversationId,
        local_id: MessageId,
        result: Result<MessageRow, SyncError>,
    ) {
        match result {
            Ok(row) => {
                let message = row.into_message();
                if self.selected.as_ref() == Some(&conversation_id) {
                    if let Some(window) = self.window.as_mut() {
                        // Swap the optimistic entry for the persisted row.
                        window.remove(&local_id);
                        window.append_local(message.clone());
                    }
                }
                self.store.apply_message_preview(&message);
                let _ = self.event_tx.send(EngineEvent::MessageSent(message));
            }
            Err(e) => {
                // No rollback — the optimistic message stays until the next
                // poll corrects the window.
                tracing::warn!(conversation = %conversation_id, error = %e, "send failed");
                let _ = self.event_tx.send(EngineEvent::Error(e));
            }
        }
    }

    fn handle_mark_read(&mut self) {
        let Some(selected) = self.selected.clone() else {
            return;
        };
        self.store.reset_unread(&selected);
        self.spawn_mark_read(selected);
    }

    fn spawn_mark_read(&self, id: ConversationId) {
        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.mark_read(&id).await;
            let _ = cmd_tx.send(EngineCommand::ActionFinished {
                conversation_id: id,
                action: "mark_read",
                result,
            });
        });
    }

    fn handle_mutate(&mut self, id: ConversationId, patch: ConversationPatch) {
        self.store.apply_patch(&id, &patch);

        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.mutate_conversation(&id, &patch).await;
            let _ = cmd_tx.send(EngineCommand::ActionFinished {
                conversation_id: id,
                action: "mutate",
                result,
            });
        });
    }

    fn handle_delete(&mut self, id: ConversationId) {
        self.store.remove(&id);
        if self.selected.as_ref() == Some(&id) {
            self.selected = None;
            self.window = None;
            let _ = self.selection_tx.send(None);
        }

        let backend = Arc::clone(&self.backend);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = backend.delete_conversation(&id).await;
            let _ = cmd_tx.send(EngineCommand::ActionFinished {
                conversation_id: id,
                action: "delete",
                result,
            });
        });
    }

    fn handle_action_finished(
        &mut self,
        conversation_id: ConversationId,
        action: &'static str,
        result: Result<(), SyncError>,
    ) {
        if let Err(e) = result {
            tracing::warn!(conversation = %conversation_id, action, error = %e, "local action rejected upstream");
            let _ = self.event_tx.send(EngineEvent::Error(e));
        }
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    fn maybe_trigger_analysis(&mut self) {
        let Some(selected) = self.selected.clone() else {
            return;
        };
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.conversation_id() != &selected {
            return;
        }
        let count = window.messages().len();
        let conversation = self.store.get(&selected);
        let has_result = conversation.is_some_and(|c| c.ai_summary.is_some());
        if !self
            .analysis
            .should_trigger(&selected, count, has_result, self.config.analysis_batch)
        {
            return;
        }
        self.analysis.begin(selected.clone(), count);

        let participant_name = conversation
            .and_then(|c| c.participant_name.clone())
            .or_else(|| {
                conversation
                    .and_then(|c| c.participant_id.as_ref().map(|p| p.as_str().to_string()))
            })
            .unwrap_or_default();
        let messages = window.messages().to_vec();
        let analyzer = Arc::clone(&self.analyzer);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = analyzer.analyze(&messages, &participant_name).await;
            let _ = cmd_tx.send(EngineCommand::AnalysisFinished {
                conversation_id: selected,
                result,
            });
        });
    }

    fn handle_analysis_finished(
        &mut self,
        conversation_id: ConversationId,
        result: Result<AnalysisResult, SyncError>,
    ) {
        self.analysis.finish(&conversation_id);
        match result {
            Ok(analysis) => {
                // Always patch; a reader that switched away ignores the
                // stale derived fields.
                self.store
                    .apply_patch(&conversation_id, &ConversationPatch::from_analysis(&analysis));
                let _ = self
                    .event_tx
                    .send(EngineEvent::AnalysisCompleted(conversation_id));
            }
            Err(e) => {
                // Swallowed: no retry until the next natural trigger.
                tracing::warn!(conversation = %conversation_id, error = %e, "analysis failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapshot publication
    // ------------------------------------------------------------------

    fn publish(&self) {
        let window = self.window.as_ref().map(|w| WindowSnapshot {
            conversation_id: w.conversation_id().clone(),
            messages: w.messages().to_vec(),
            has_older: w.has_older(),
            loading: w.state() == WindowState::Loading,
            loading_older: w.state() == WindowState::LoadingOlder,
        });
        let _ = self.snapshot_tx.send(EngineSnapshot {
            conversations: self.store.items().to_vec(),
            total: self.store.total(),
            has_more: self.store.has_more(),
            list_loading: self.list_loading,
            selected: self.selected.clone(),
            window,
        });
    }
}
