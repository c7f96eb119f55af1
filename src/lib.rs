//! Conversation synchronization engine for the client pipeline app
//!
//! This crate keeps a local, UI-consumable mirror of a remote messaging
//! inbox consistent while updates arrive concurrently from three sources:
//! periodic silent polling, realtime push notifications, and the user's own
//! optimistic actions. It also throttles an external text-analysis
//! collaborator so activity does not re-analyze on every keystroke.
//!
//! - **Engine**: [`SyncEngine`] — one instance per process; commands in,
//!   snapshots and events out
//! - **Collaborator contracts**: [`InboxBackend`], [`MessageAnalyzer`],
//!   [`PushStream`] (persistence, analysis, realtime — all external)
//! - **Stores**: [`ConversationStore`] and [`MessageWindow`], owned by the
//!   engine's dispatcher task
//! - **In-memory collaborators**: [`MemoryBackend`], [`ScriptedAnalyzer`]
//!   for tests and local development
//!
//! # Example
//!
//! ```ignore
//! use inbox_core::{EngineConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(backend, analyzer, push_stream, EngineConfig::default());
//! engine.select_conversation(Some(conversation_id));
//! let snapshot = engine.snapshot();
//! ```

pub mod analysis;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ids;
pub mod rows;
mod scheduler;
pub mod store;
pub mod types;
pub mod window;

pub use backend::memory::{MemoryBackend, ScriptedAnalyzer};
pub use backend::{InboxBackend, MessageAnalyzer, PushEvent, PushStream};
pub use config::EngineConfig;
pub use engine::{EngineEvent, EngineSnapshot, SyncEngine, WindowSnapshot};
pub use error::SyncError;
pub use ids::{ClientId, ConversationId, MessageId, ParticipantId, TagId, UserId};
pub use rows::{ConversationPage, ConversationRow, MessageRow};
pub use store::ConversationStore;
pub use types::{AnalysisResult, Conversation, ConversationPatch, LeadStatus, Message};
pub use window::{MessageWindow, WindowState};
