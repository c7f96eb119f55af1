//! Integration tests for the engine over the in-memory collaborators
//!
//! These drive the full dispatcher: bootstrap, selection, push events,
//! optimistic actions, silent polls, and the analysis trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::backend::memory::{MemoryBackend, ScriptedAnalyzer};
use crate::backend::PushEvent;
use crate::config::EngineConfig;
use crate::engine::{EngineEvent, EngineSnapshot, SyncEngine};
use crate::error::SyncError;
use crate::ids::ConversationId;
use crate::rows::{ConversationRow, MessageRow};
use crate::types::LeadStatus;

const WAIT: Duration = Duration::from_secs(2);

fn conv_row(id: &str, participant: &str, time: i64) -> ConversationRow {
    ConversationRow {
        conversation_id: id.to_string(),
        participant_id: Some(participant.to_string()),
        participant_name: Some(format!("contact-{}", participant)),
        last_message_text: Some(format!("preview-{}", time)),
        last_message_time: time,
        last_message_from_owner: false,
        unread_count: 0,
        assigned_to: None,
        linked_client_id: None,
        tags: Vec::new(),
        lead_status: None,
    }
}

fn msg_row(id: &str, conversation: &str, time: i64) -> MessageRow {
    MessageRow {
        id: id.to_string(),
        conversation_id: conversation.to_string(),
        is_from_owner: false,
        text: format!("msg-{}", id),
        attachments: Vec::new(),
        timestamp: time,
    }
}

fn cid(s: &str) -> ConversationId {
    ConversationId::from_string(s)
}

struct Harness {
    engine: SyncEngine,
    backend: Arc<MemoryBackend>,
    analyzer: Arc<ScriptedAnalyzer>,
    push_tx: mpsc::UnboundedSender<PushEvent>,
    snapshots: watch::Receiver<EngineSnapshot>,
}

/// Timers parked far away so tests drive every transition explicitly.
fn quiet_config() -> EngineConfig {
    EngineConfig {
        list_poll_ms: 3_600_000,
        thread_poll_ms: 3_600_000,
        ..EngineConfig::default()
    }
}

fn make_engine(backend: Arc<MemoryBackend>, config: EngineConfig) -> Harness {
    let analyzer = Arc::new(ScriptedAnalyzer::new());
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let push = Box::pin(UnboundedReceiverStream::new(push_rx));
    let engine = SyncEngine::new(
        Arc::clone(&backend) as Arc<dyn crate::backend::InboxBackend>,
        Arc::clone(&analyzer) as Arc<dyn crate::backend::MessageAnalyzer>,
        push,
        config,
    );
    let snapshots = engine.subscribe();
    Harness {
        engine,
        backend,
        analyzer,
        push_tx,
        snapshots,
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<EngineSnapshot>, pred: F) -> EngineSnapshot
where
    F: Fn(&EngineSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if pred(&snap) {
                    return snap.clone();
                }
            }
            rx.changed().await.expect("engine task ended");
        }
    })
    .await
    .expect("snapshot condition not reached")
}

async fn wait_until<F: Fn() -> bool>(pred: F) {
    timeout(WAIT, async {
        while !pred() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn wait_event<F>(engine: &mut SyncEngine, pred: F) -> EngineEvent
where
    F: Fn(&EngineEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = engine.next_event().await.expect("engine task ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received")
}

fn window_ready(snap: &EngineSnapshot, id: &str) -> bool {
    snap.window
        .as_ref()
        .is_some_and(|w| w.conversation_id.as_str() == id && !w.loading)
}

// ============================================================================
// Bootstrap and pagination
// ============================================================================

#[tokio::test]
async fn test_bootstrap_loads_first_page_sorted() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 10));
    backend.seed_conversation(conv_row("c2", "p2", 30));
    let mut h = make_engine(backend, quiet_config());

    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;
    let ids: Vec<&str> = snap.conversations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);
    assert_eq!(snap.total, 2);
    assert!(!snap.has_more);
    assert!(!snap.list_loading);
}

#[tokio::test]
async fn test_pagination_is_monotonic() {
    let backend = Arc::new(MemoryBackend::new());
    for (i, time) in [50, 40, 30, 20, 10].iter().enumerate() {
        backend.seed_conversation(conv_row(
            &format!("c{}", i + 1),
            &format!("p{}", i + 1),
            *time,
        ));
    }
    let config = EngineConfig {
        page_size: 2,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);

    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;
    assert!(snap.has_more);

    h.engine.load_more_conversations();
    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 4).await;
    assert!(snap.has_more);

    h.engine.load_more_conversations();
    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 5).await;
    assert!(!snap.has_more);
    assert_eq!(snap.total, 5);

    // no id appears twice
    let mut ids: Vec<&str> = snap.conversations.iter().map(|c| c.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    // exhausted list: a further call changes nothing
    h.engine.load_more_conversations();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.engine.snapshot().conversations.len(), 5);
}

// ============================================================================
// Unread suppression
// ============================================================================

#[tokio::test]
async fn test_unread_suppressed_for_active_selection() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_conversation(conv_row("c2", "p2", 90));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;

    for i in 0..3 {
        let _ = h
            .push_tx
            .send(PushEvent::Message(msg_row(&format!("m{}", i), "c1", 200 + i)));
    }
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 3)
    })
    .await;

    // every push landed in the window, none in the badge
    let c1 = snap.conversations.iter().find(|c| c.id.as_str() == "c1").unwrap();
    assert_eq!(c1.unread_count, 0);

    // a push for a background conversation does increment
    let _ = h.push_tx.send(PushEvent::Message(msg_row("m9", "c2", 300)));
    wait_for(&mut h.snapshots, |s| {
        s.conversations
            .iter()
            .any(|c| c.id.as_str() == "c2" && c.unread_count == 1)
    })
    .await;
    // redelivery of the same event is a no-op
    let _ = h.push_tx.send(PushEvent::Message(msg_row("m9", "c2", 300)));
    sleep(Duration::from_millis(50)).await;
    let c2 = h
        .engine
        .snapshot()
        .conversations
        .iter()
        .find(|c| c.id.as_str() == "c2")
        .unwrap()
        .clone();
    assert_eq!(c2.unread_count, 1);
}

#[tokio::test]
async fn test_distinct_same_millisecond_pushes_both_count() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_conversation(conv_row("c2", "p2", 90));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;

    // two different messages for a background conversation land in the
    // same millisecond; both count
    let _ = h.push_tx.send(PushEvent::Message(msg_row("ma", "c2", 300)));
    let _ = h.push_tx.send(PushEvent::Message(msg_row("mb", "c2", 300)));
    wait_for(&mut h.snapshots, |s| {
        s.conversations
            .iter()
            .any(|c| c.id.as_str() == "c2" && c.unread_count == 2)
    })
    .await;

    // redelivering one of them is still a no-op
    let _ = h.push_tx.send(PushEvent::Message(msg_row("ma", "c2", 300)));
    sleep(Duration::from_millis(50)).await;
    let snap = h.engine.snapshot();
    let c2 = snap.conversations.iter().find(|c| c.id.as_str() == "c2").unwrap();
    assert_eq!(c2.unread_count, 2);
}

#[tokio::test]
async fn test_select_resets_unread_and_marks_read_upstream() {
    let backend = Arc::new(MemoryBackend::new());
    let mut row = conv_row("c1", "p1", 100);
    row.unread_count = 3;
    backend.seed_conversation(row);
    let mut h = make_engine(backend, quiet_config());

    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;
    assert_eq!(snap.conversations[0].unread_count, 3);

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| {
        s.conversations[0].unread_count == 0 && window_ready(s, "c1")
    })
    .await;
    wait_until(|| h.backend.mark_read_calls().contains(&cid("c1"))).await;
}

// ============================================================================
// Staleness and identity
// ============================================================================

#[tokio::test]
async fn test_stale_poll_snapshot_does_not_regress_push() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let config = EngineConfig {
        list_poll_ms: 100,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    // push advances the preview past the backend's (stale) snapshot
    let mut fresh = conv_row("c1", "p1", 200);
    fresh.last_message_text = Some("from push".to_string());
    let _ = h.push_tx.send(PushEvent::Conversation(fresh));
    wait_for(&mut h.snapshots, |s| {
        s.conversations[0].last_message_text.as_deref() == Some("from push")
    })
    .await;

    // several silent polls of the old snapshot later, nothing regressed
    sleep(Duration::from_millis(350)).await;
    let snap = h.engine.snapshot();
    assert_eq!(snap.conversations[0].last_message_time, 200);
    assert_eq!(
        snap.conversations[0].last_message_text.as_deref(),
        Some("from push")
    );
}

#[tokio::test]
async fn test_upstream_deletion_converges_on_silent_poll() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_conversation(conv_row("c2", "p2", 90));
    let config = EngineConfig {
        list_poll_ms: 100,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;

    // c2 disappears upstream (deleted from another device)
    h.backend.set_conversations(vec![conv_row("c1", "p1", 100)]);
    let snap = wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;
    assert_eq!(snap.conversations[0].id.as_str(), "c1");
    assert_eq!(snap.total, 1);
}

#[tokio::test]
async fn test_rotated_thread_id_never_resurrects() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let config = EngineConfig {
        list_poll_ms: 100,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    // the platform minted a new thread id for the same contact
    let _ = h.push_tx.send(PushEvent::Conversation(conv_row("c2", "p1", 200)));
    wait_for(&mut h.snapshots, |s| {
        s.conversations.len() == 1 && s.conversations[0].id.as_str() == "c2"
    })
    .await;

    // the backend still only knows c1; silent polls must not bring it back
    sleep(Duration::from_millis(350)).await;
    let snap = h.engine.snapshot();
    let ids: Vec<&str> = snap.conversations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2"]);

    // neither does a late push for the dead id
    let _ = h.push_tx.send(PushEvent::Conversation(conv_row("c1", "p1", 150)));
    sleep(Duration::from_millis(50)).await;
    let snap = h.engine.snapshot();
    let ids: Vec<&str> = snap.conversations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2"]);
}

// ============================================================================
// Window isolation and paging
// ============================================================================

#[tokio::test]
async fn test_window_isolation_across_fast_switches() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("a", "pa", 100));
    backend.seed_conversation(conv_row("b", "pb", 90));
    backend.seed_message(msg_row("a1", "a", 10));
    backend.seed_message(msg_row("b1", "b", 20));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 2).await;

    // A's fetch hangs; B is selected before it resolves
    h.backend.hold_thread_fetches(&cid("a"));
    h.engine.select_conversation(Some(cid("a")));
    h.engine.select_conversation(Some(cid("b")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "b")).await;

    // A's response lands late and must be ignored
    h.backend.release_thread_fetches(&cid("a"));
    sleep(Duration::from_millis(100)).await;

    let snap = h.engine.snapshot();
    let window = snap.window.expect("window for b");
    assert_eq!(window.conversation_id.as_str(), "b");
    let ids: Vec<&str> = window.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["b1"]);
}

#[tokio::test]
async fn test_load_older_pages_backwards() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    for i in 1..=5 {
        backend.seed_message(msg_row(&format!("m{}", i), "c1", i * 10));
    }
    let config = EngineConfig {
        window_limit: 2,
        older_batch: 2,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    let snap = wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;
    let window = snap.window.unwrap();
    let ids: Vec<&str> = window.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m4", "m5"]);
    assert!(window.has_older);

    h.engine.load_older_messages();
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 4)
    })
    .await;
    assert!(snap.window.as_ref().unwrap().has_older);

    h.engine.load_older_messages();
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 5)
    })
    .await;
    let window = snap.window.unwrap();
    assert!(!window.has_older);
    let ids: Vec<&str> = window.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3", "m4", "m5"]);
}

#[tokio::test]
async fn test_silent_thread_refresh_picks_up_new_messages() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_message(msg_row("m1", "c1", 10));
    let config = EngineConfig {
        thread_poll_ms: 100,
        ..quiet_config()
    };
    let mut h = make_engine(backend, config);
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 1)
    })
    .await;

    // a message appears upstream without any push event
    h.backend.seed_message(msg_row("m2", "c1", 20));
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 2)
    })
    .await;
    // the refresh was silent: no loading flag ever surfaced with it
    assert!(!snap.window.as_ref().unwrap().loading);
    assert!(!snap.list_loading);
}

// ============================================================================
// Optimistic actions
// ============================================================================

#[tokio::test]
async fn test_send_is_optimistic_then_confirmed() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;

    h.engine.send_message("hello there");
    // optimistic entry appears before the backend confirms
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 1)
    })
    .await;
    assert_eq!(snap.window.as_ref().unwrap().messages[0].text, "hello there");

    let event = wait_event(&mut h.engine, |e| matches!(e, EngineEvent::MessageSent(_))).await;
    let EngineEvent::MessageSent(message) = event else {
        unreachable!()
    };
    assert!(message.id.as_str().starts_with("srv-"));

    // the optimistic entry was swapped for the persisted row
    let snap = wait_for(&mut h.snapshots, |s| {
        s.window
            .as_ref()
            .is_some_and(|w| w.messages.len() == 1 && w.messages[0].id.as_str().starts_with("srv-"))
    })
    .await;
    assert!(snap.conversations[0].last_message_from_owner);
}

#[tokio::test]
async fn test_failed_send_surfaces_conflict_without_rollback() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;

    h.backend.fail_next_send();
    h.engine.send_message("doomed");

    let event = wait_event(&mut h.engine, |e| {
        matches!(e, EngineEvent::Error(SyncError::Conflict(_)))
    })
    .await;
    assert!(matches!(event, EngineEvent::Error(SyncError::Conflict(_))));

    // the optimistic message is still there; the next poll would correct it
    let snap = h.engine.snapshot();
    assert_eq!(snap.window.as_ref().unwrap().messages.len(), 1);
    assert_eq!(snap.window.as_ref().unwrap().messages[0].text, "doomed");
}

#[tokio::test]
async fn test_local_mutation_applies_immediately_and_persists() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.set_lead_status(cid("c1"), LeadStatus::Qualified);
    wait_for(&mut h.snapshots, |s| {
        s.conversations[0].lead_status == LeadStatus::Qualified
    })
    .await;
    wait_until(|| !h.backend.recorded_patches().is_empty()).await;
    let (id, patch) = h.backend.recorded_patches().remove(0);
    assert_eq!(id, cid("c1"));
    assert_eq!(patch.lead_status, Some(LeadStatus::Qualified));
}

#[tokio::test]
async fn test_delete_clears_selection_and_persists() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;

    h.engine.delete_conversation(cid("c1"));
    wait_for(&mut h.snapshots, |s| {
        s.conversations.is_empty() && s.selected.is_none() && s.window.is_none()
    })
    .await;
    wait_until(|| h.backend.deleted_conversations().contains(&cid("c1"))).await;
}

// ============================================================================
// Analysis trigger
// ============================================================================

#[tokio::test]
async fn test_analysis_runs_on_first_message_then_every_batch() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_message(msg_row("m1", "c1", 10));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.engine.select_conversation(Some(cid("c1")));
    // first analysis: no prior result, one message
    wait_for(&mut h.snapshots, |s| {
        s.conversations[0].ai_summary.is_some()
    })
    .await;
    assert_eq!(h.analyzer.calls(), 1);

    // message 2: below the batch threshold, no call
    let _ = h.push_tx.send(PushEvent::Message(msg_row("m2", "c1", 20)));
    wait_for(&mut h.snapshots, |s| {
        s.window.as_ref().is_some_and(|w| w.messages.len() == 2)
    })
    .await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.analyzer.calls(), 1);

    // message 3: batch boundary, second call
    let _ = h.push_tx.send(PushEvent::Message(msg_row("m3", "c1", 30)));
    wait_until(|| h.analyzer.calls() == 2).await;
}

#[tokio::test]
async fn test_analysis_result_patched_into_conversation() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_message(msg_row("m1", "c1", 10));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.analyzer.queue_result(crate::types::AnalysisResult {
        summary: Some("asked about pricing".to_string()),
        best_time_to_contact: Some("mornings".to_string()),
        viewed_entity: None,
    });
    h.engine.select_conversation(Some(cid("c1")));

    let snap = wait_for(&mut h.snapshots, |s| s.conversations[0].ai_summary.is_some()).await;
    let conv = &snap.conversations[0];
    assert_eq!(conv.ai_summary.as_deref(), Some("asked about pricing"));
    assert_eq!(conv.best_time_to_contact.as_deref(), Some("mornings"));

    let event = wait_event(&mut h.engine, |e| {
        matches!(e, EngineEvent::AnalysisCompleted(_))
    })
    .await;
    assert!(matches!(event, EngineEvent::AnalysisCompleted(id) if id == cid("c1")));
}

#[tokio::test]
async fn test_analysis_failure_is_swallowed() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_conversation(conv_row("c1", "p1", 100));
    backend.seed_message(msg_row("m1", "c1", 10));
    let mut h = make_engine(backend, quiet_config());
    wait_for(&mut h.snapshots, |s| s.conversations.len() == 1).await;

    h.analyzer.set_fail(true);
    h.engine.select_conversation(Some(cid("c1")));
    wait_for(&mut h.snapshots, |s| window_ready(s, "c1")).await;
    wait_until(|| h.analyzer.calls() == 1).await;

    // no result patched, no error event, and no immediate retry
    sleep(Duration::from_millis(50)).await;
    let snap = h.engine.snapshot();
    assert!(snap.conversations[0].ai_summary.is_none());
    assert!(h.engine.try_recv().is_none());
    assert_eq!(h.analyzer.calls(), 1);
}
