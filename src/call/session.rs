//! State owned by one active call

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Conversation;

/// One phone-call-like interaction
///
/// Owns the conversation handle; dropping the session releases it.
pub struct CallSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    conversation: Box<dyn Conversation>,
    pending_transcript: String,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("active", &self.is_active())
            .field("turns", &self.conversation.turns())
            .finish_non_exhaustive()
    }
}

impl CallSession {
    /// Create a session around a freshly opened conversation
    #[must_use]
    pub fn new(conversation: Box<dyn Conversation>, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            conversation,
            pending_transcript: String::new(),
            cancel,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True until the call is ended
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token cancelled when the call ends
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn conversation(&mut self) -> &mut dyn Conversation {
        self.conversation.as_mut()
    }

    /// Store the finalized recognition result for this listening span
    pub fn store_transcript(&mut self, transcript: &str) {
        transcript.trim().clone_into(&mut self.pending_transcript);
    }

    /// Read and clear the pending transcript
    ///
    /// Returns `None` when nothing (or only whitespace) was recognized
    pub fn take_transcript(&mut self) -> Option<String> {
        let transcript = std::mem::take(&mut self.pending_transcript);
        (!transcript.is_empty()).then_some(transcript)
    }
}
