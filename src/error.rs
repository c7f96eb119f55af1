use std::fmt;

/// Errors surfaced by the synchronization engine.
///
/// The three variants are handled differently by the dispatcher:
/// - `Transient` failures are left for the refresh scheduler's next tick,
///   never retried in a tight loop.
/// - `Conflict` means an optimistic local action was rejected upstream; the
///   local state is left as-is and converges on the next poll.
/// - `Analysis` failures are swallowed until the next natural trigger.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// Network or timeout failure on a poll, push reconnect, or send
    Transient(String),

    /// Optimistic local action rejected by the persistence collaborator
    Conflict(String),

    /// Analysis collaborator failed or timed out
    Analysis(String),
}

impl SyncError {
    pub fn transient(msg: impl Into<String>) -> Self {
        SyncError::Transient(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        SyncError::Conflict(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        SyncError::Analysis(msg.into())
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Transient(msg) => write!(f, "Transient I/O error: {}", msg),
            SyncError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            SyncError::Analysis(msg) => write!(f, "Analysis error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}
