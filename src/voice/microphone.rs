//! Microphone speech capture

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{AudioCapture, SAMPLE_RATE, SpeechCapture, SpeechToText, UtteranceDetector};
use crate::audio::samples_to_wav;
use crate::{Error, Result};

/// Longest wait for one capture chunk before re-checking abort and timeouts
const CHUNK_WAIT: Duration = Duration::from_millis(100);

/// Hard cap on one utterance
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Records one utterance from the default microphone and transcribes it
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
    listen_timeout: Duration,
    /// Bumped on abort; a capture armed under an older value stops
    epoch: Arc<AtomicU64>,
}

impl MicrophoneRecognizer {
    /// `listen_timeout` bounds how long to wait for speech to start
    #[must_use]
    pub fn new(stt: SpeechToText, listen_timeout: Duration) -> Self {
        Self {
            stt,
            listen_timeout,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl SpeechCapture for MicrophoneRecognizer {
    fn is_supported(&self) -> bool {
        AudioCapture::is_available()
    }

    async fn listen(&self) -> Result<Option<String>> {
        let armed_at = self.epoch.load(Ordering::SeqCst);
        let epoch = Arc::clone(&self.epoch);
        let timeout = self.listen_timeout;

        let utterance =
            tokio::task::spawn_blocking(move || record_utterance(&epoch, armed_at, timeout))
                .await
                .map_err(|e| Error::Audio(e.to_string()))??;

        let Some(samples) = utterance else {
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let transcript = self.stt.transcribe(&wav).await?;

        if self.epoch.load(Ordering::SeqCst) != armed_at {
            tracing::debug!("capture aborted during transcription");
            return Ok(None);
        }

        Ok((!transcript.is_empty()).then_some(transcript))
    }

    fn abort(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// Record until an utterance completes, the span times out, or capture is aborted
///
/// Runs on a blocking thread since the `cpal` stream is not `Send`.
fn record_utterance(
    epoch: &AtomicU64,
    armed_at: u64,
    timeout: Duration,
) -> Result<Option<Vec<f32>>> {
    let mut capture = AudioCapture::new()?;
    let mut detector = UtteranceDetector::new();
    capture.start()?;

    let started = Instant::now();
    tracing::debug!(timeout_ms = timeout.as_millis(), "listening for utterance");

    loop {
        if epoch.load(Ordering::SeqCst) != armed_at {
            tracing::debug!("capture aborted");
            return Ok(None);
        }

        if let Some(chunk) = capture.next_chunk(CHUNK_WAIT)
            && detector.process(&chunk)
        {
            return Ok(Some(detector.take_utterance()));
        }

        let elapsed = started.elapsed();
        if elapsed > timeout && !detector.in_speech() {
            tracing::debug!("no speech before timeout");
            return Ok(None);
        }
        if elapsed > timeout + MAX_UTTERANCE {
            tracing::debug!("utterance cut at maximum length");
            return Ok(Some(detector.take_utterance()));
        }
    }
}
