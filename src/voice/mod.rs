//! Host voice I/O
//!
//! Speech capture (microphone + transcription, or typed lines) and audio
//! output (speakers, or WAV files on disk). The call controller only sees
//! the [`SpeechCapture`] and [`AudioOutput`] traits.

mod capture;
mod endpoint;
mod microphone;
mod playback;
mod stt;
mod typed;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use capture::{AudioCapture, SAMPLE_RATE};
pub use endpoint::{DetectorState, UtteranceDetector, rms};
pub use microphone::MicrophoneRecognizer;
pub use playback::{AudioPlayback, FileOutput, SpeakerOutput};
pub use stt::{SpeechToText, SttProvider};
pub use typed::TypedInput;

use crate::Result;
use crate::audio::WavBlob;

/// Produces at most one final transcript per listening span
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Whether capture can run on this host
    fn is_supported(&self) -> bool;

    /// Capture one utterance and transcribe it
    ///
    /// Resolves to `Ok(None)` when the span ended without speech or was
    /// aborted.
    async fn listen(&self) -> Result<Option<String>>;

    /// Abort any in-progress capture
    fn abort(&self);
}

/// Plays one audio clip at a time
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play a clip to completion
    ///
    /// Nothing is played once `cancel` fires, including a clip whose playback
    /// had not started yet when it did.
    async fn play(&self, clip: WavBlob, cancel: CancellationToken) -> Result<()>;

    /// Halt playback immediately
    fn stop(&self);
}
