//! Call orchestration
//!
//! A call loops through listen → transcribe → query model → synthesize →
//! play → listen. The turn-taking rules live in [`state`]; the async driver
//! that talks to the services lives in [`controller`]; [`manager`] owns the
//! one active call and exposes start/end to the presentation layer.

mod controller;
mod manager;
mod session;
pub mod state;
mod status;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use controller::{CallController, TurnSettings, collect_reply, collect_speech};
pub use manager::{CallManager, CallServices};
pub use session::CallSession;
pub use state::{TurnEvent, TurnMachine, TurnState};
pub use status::{CallStatus, Indicator, StatusReporter, StatusText};

use crate::Result;

/// Ordered stream of reply text fragments
pub type TextStream = BoxStream<'static, Result<String>>;

/// Ordered stream of synthesized audio fragments
pub type AudioStream = BoxStream<'static, Result<AudioFragment>>;

/// One piece of a streamed synthesis response
///
/// Either field may be absent on any given fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFragment {
    /// Base64-encoded raw PCM chunk
    pub data: Option<String>,
    /// MIME type describing the PCM layout (e.g. `audio/L16;rate=24000`)
    pub mime_type: Option<String>,
}

impl AudioFragment {
    /// Fragment carrying a payload chunk and its MIME type
    #[must_use]
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            mime_type: Some(mime_type.into()),
        }
    }
}

/// Stateful dialogue with the conversational model
///
/// Owned exclusively by the call session and dropped when the call ends
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Send one user message and stream back the reply fragments
    async fn send(&mut self, message: &str) -> Result<TextStream>;

    /// Record a completed exchange in the dialogue history
    fn record_exchange(&mut self, message: &str, reply: &str);

    /// Number of completed exchanges
    fn turns(&self) -> usize;
}

/// Factory for conversation handles
pub trait ChatModel: Send + Sync {
    /// Open a new conversation primed with a system instruction
    fn open_conversation(&self, system_instruction: &str) -> Box<dyn Conversation>;
}

/// Text-to-speech service
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text into a stream of audio fragments
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}
