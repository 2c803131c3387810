//! Async driver for one call
//!
//! Runs the turn loop against the external services. Each suspension point
//! is raced against the session's cancellation token, so a result arriving
//! after the call ended is dropped instead of acted upon.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{
    AudioStream, CallServices, CallSession, SpeechSynthesizer, StatusReporter, StatusText,
    TextStream, TurnEvent, TurnMachine, TurnState,
};
use crate::audio::{AudioDescriptor, WavBlob, decode_base64, parse_audio_descriptor};
use crate::voice::{AudioOutput, SpeechCapture};
use crate::{Error, Result};

/// Pause after a recognition error before re-arming capture
const RECOGNITION_BACKOFF: Duration = Duration::from_millis(250);

/// Per-call behaviour
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Spoken when the call starts
    pub greeting: String,
    /// Spoken when the model fails or returns nothing
    pub fallback_reply: String,
    /// Upper bound on a full model reply
    pub reply_timeout: Duration,
    /// Upper bound on a full synthesis response
    pub speech_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            greeting: "سلام، آوا هستم. چطور میتونم کمکتون کنم؟".to_string(),
            fallback_reply: "متاسفانه مشکلی پیش آمده. لطفا دوباره تلاش کنید.".to_string(),
            reply_timeout: Duration::from_secs(30),
            speech_timeout: Duration::from_secs(60),
        }
    }
}

/// Drives listen → respond → speak for one call
pub struct CallController {
    machine: TurnMachine,
    session: CallSession,
    cancel: CancellationToken,
    capture: Arc<dyn SpeechCapture>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    status: StatusReporter,
    settings: TurnSettings,
}

impl CallController {
    #[must_use]
    pub fn new(
        session: CallSession,
        services: &CallServices,
        status: StatusReporter,
        settings: TurnSettings,
    ) -> Self {
        Self {
            machine: TurnMachine::new(),
            cancel: session.cancellation().clone(),
            session,
            capture: Arc::clone(&services.capture),
            synthesizer: Arc::clone(&services.synthesizer),
            output: Arc::clone(&services.output),
            status,
            settings,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.machine.state()
    }

    /// Run until the call is ended
    pub async fn run(mut self) {
        let call_id = self.session.id();
        tracing::info!(%call_id, "call loop started");

        if self.drive().await.is_none() {
            tracing::debug!(%call_id, state = %self.machine.state(), "call cancelled");
        }

        self.machine.apply(TurnEvent::CallEnded);
        let elapsed = Utc::now() - self.session.started_at();
        tracing::info!(
            %call_id,
            turns = self.session.conversation().turns(),
            duration_secs = elapsed.num_seconds(),
            "call loop finished"
        );
    }

    /// The turn loop; returns `None` once the call is cancelled
    async fn drive(&mut self) -> Option<()> {
        self.transition(TurnEvent::CallStarted);
        let greeting = self.settings.greeting.clone();
        self.speak(&greeting).await?;

        loop {
            let request = self.listen().await?;
            let reply = self.respond(&request).await?;
            self.transition(TurnEvent::ReplyReady);
            self.speak(&reply).await?;
        }
    }

    fn transition(&mut self, event: TurnEvent) -> Option<TurnState> {
        let next = self.machine.apply(event);
        if next.is_none() {
            tracing::warn!(state = %self.machine.state(), ?event, "unexpected turn event");
        }
        next
    }

    /// Arm capture until a transcript is accepted
    async fn listen(&mut self) -> Option<String> {
        loop {
            if !self.machine.can_listen() {
                tracing::warn!(state = %self.machine.state(), "capture not allowed in this state");
                return None;
            }

            self.status.publish(TurnState::Listening, StatusText::Listening);
            let outcome = until_cancelled(&self.cancel, self.capture.listen()).await?;

            match outcome {
                Ok(Some(transcript)) => self.session.store_transcript(&transcript),
                Ok(None) => tracing::debug!("no speech detected"),
                Err(e) => {
                    tracing::warn!(error = %e, "speech recognition failed");
                    self.status.publish(TurnState::Listening, StatusText::RecognitionError);
                    until_cancelled(&self.cancel, tokio::time::sleep(RECOGNITION_BACKOFF)).await?;
                }
            }

            match self.session.take_transcript() {
                Some(transcript) => {
                    if self.transition(TurnEvent::TranscriptReady).is_some() {
                        tracing::info!(%transcript, "user utterance");
                        return Some(transcript);
                    }
                }
                None => {
                    self.transition(TurnEvent::NoSpeech);
                }
            }
        }
    }

    /// Query the model; never fails, falls back to the apology reply
    async fn respond(&mut self, request: &str) -> Option<String> {
        self.status.publish(TurnState::Processing, StatusText::Processing);

        let timeout = self.settings.reply_timeout;
        let conversation = self.session.conversation();
        let query = async {
            let stream = conversation.send(request).await?;
            collect_reply(stream).await
        };
        let outcome = until_cancelled(&self.cancel, tokio::time::timeout(timeout, query)).await?;

        let reply = match outcome {
            Ok(Ok(reply)) if !reply.trim().is_empty() => {
                self.session.conversation().record_exchange(request, &reply);
                tracing::info!(reply_len = reply.len(), "model replied");
                return Some(reply);
            }
            Ok(Ok(_)) => {
                tracing::warn!("model returned an empty reply");
                self.settings.fallback_reply.clone()
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "model query failed");
                self.status.publish(TurnState::Processing, StatusText::ServerError);
                self.settings.fallback_reply.clone()
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "model reply timed out");
                self.status.publish(TurnState::Processing, StatusText::ServerError);
                self.settings.fallback_reply.clone()
            }
        };

        Some(reply)
    }

    /// Speak an utterance, then hand the turn back to the user
    ///
    /// Any synthesis or playback failure is logged and swallowed
    async fn speak(&mut self, text: &str) -> Option<()> {
        self.machine.speech_started();
        self.status.publish(TurnState::Speaking, StatusText::GeneratingAudio);

        if let Err(e) = self.synthesize_and_play(text).await? {
            tracing::warn!(error = %e, "speech failed, resuming listening");
            self.status.publish(TurnState::Speaking, StatusText::SpeechError);
        }

        self.machine.speech_finished();
        self.transition(TurnEvent::SpeechFinished);
        Some(())
    }

    async fn synthesize_and_play(&self, text: &str) -> Option<Result<()>> {
        if text.trim().is_empty() {
            return Some(Ok(()));
        }

        let timeout = self.settings.speech_timeout;
        let synthesis = async {
            let stream = self.synthesizer.synthesize(text).await?;
            collect_speech(stream).await
        };

        let clip = match until_cancelled(&self.cancel, tokio::time::timeout(timeout, synthesis)).await? {
            Ok(Ok(Some(clip))) => clip,
            Ok(Ok(None)) => {
                tracing::warn!("no audio content received from synthesis");
                return Some(Ok(()));
            }
            Ok(Err(e)) => return Some(Err(e)),
            Err(_) => {
                return Some(Err(Error::Synthesis(format!(
                    "no audio within {}s",
                    timeout.as_secs()
                ))));
            }
        };

        tracing::debug!(
            bytes = clip.data_len(),
            duration_ms = clip.duration().as_millis(),
            "playing reply"
        );
        self.status.publish(TurnState::Speaking, StatusText::Speaking);
        until_cancelled(&self.cancel, self.output.play(clip, self.cancel.clone())).await
    }
}

/// Await `fut` unless the call ends first
///
/// A result that completes after cancellation is discarded.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => (!cancel.is_cancelled()).then_some(out),
    }
}

/// Concatenate reply fragments in arrival order
///
/// # Errors
///
/// Returns the first stream error
pub async fn collect_reply(mut stream: TextStream) -> Result<String> {
    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        reply.push_str(&fragment?);
    }
    Ok(reply)
}

/// Concatenate synthesized audio and wrap it in WAV
///
/// The MIME type comes from the first fragment that carries one; later
/// ones are ignored. Returns `None` when no payload bytes arrived.
///
/// # Errors
///
/// Returns the first stream error, or `Error::InvalidEncoding` for a
/// malformed payload chunk
pub async fn collect_speech(mut stream: AudioStream) -> Result<Option<WavBlob>> {
    let mut pcm = Vec::new();
    let mut mime_type: Option<String> = None;
    let mut fragments = 0_usize;

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        fragments += 1;

        if let Some(data) = fragment.data.as_deref().filter(|d| !d.is_empty()) {
            pcm.extend_from_slice(&decode_base64(data)?);
        }

        if let Some(mime) = fragment.mime_type.filter(|m| !m.is_empty()) {
            if mime_type.is_none() {
                mime_type = Some(mime);
            } else if mime_type.as_deref() != Some(mime.as_str()) {
                tracing::debug!(ignored = %mime, "ignoring differing MIME type");
            }
        }
    }

    if pcm.is_empty() {
        return Ok(None);
    }

    let descriptor = mime_type
        .as_deref()
        .map_or_else(AudioDescriptor::default, parse_audio_descriptor);
    tracing::debug!(fragments, bytes = pcm.len(), ?descriptor, "synthesis complete");

    WavBlob::from_pcm(&pcm, descriptor).map(Some)
}
