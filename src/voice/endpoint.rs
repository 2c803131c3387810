//! Utterance endpointing
//!
//! Energy-based detection of where a spoken utterance starts and ends in the
//! microphone stream. Only complete utterances are sent for transcription.

use super::SAMPLE_RATE;

/// RMS level above which a chunk counts as voiced
const VOICE_LEVEL: f32 = 0.03;

const fn samples_in(ms: usize) -> usize {
    SAMPLE_RATE as usize * ms / 1000
}

/// Voiced audio needed before trailing silence can end an utterance
const MIN_VOICED: usize = samples_in(300);

/// Trailing silence that ends an utterance
const END_SILENCE: usize = samples_in(500);

/// Trailing silence after which a too-short utterance is abandoned
const ABANDON_SILENCE: usize = samples_in(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No voice heard yet
    Waiting,
    /// Voice heard, utterance still open
    InSpeech,
    /// Utterance closed by trailing silence, ready to take
    Complete,
}

/// Finds the end of one spoken utterance
#[derive(Debug)]
pub struct UtteranceDetector {
    state: DetectorState,
    utterance: Vec<f32>,
    voiced: usize,
    trailing_silence: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DetectorState::Waiting,
            utterance: Vec::new(),
            voiced: 0,
            trailing_silence: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns true once the utterance is complete. Further input is ignored
    /// until it is taken.
    pub fn process(&mut self, chunk: &[f32]) -> bool {
        let level = rms(chunk);
        let voiced = level > VOICE_LEVEL;

        match (self.state, voiced) {
            (DetectorState::Waiting, false) | (DetectorState::Complete, _) => {}
            (DetectorState::Waiting, true) => {
                tracing::trace!(level, "voice onset");
                self.state = DetectorState::InSpeech;
                self.append(chunk, true);
            }
            (DetectorState::InSpeech, _) => {
                self.append(chunk, voiced);

                if self.trailing_silence > END_SILENCE && self.voiced > MIN_VOICED {
                    tracing::debug!(
                        samples = self.utterance.len(),
                        voiced = self.voiced,
                        "utterance complete"
                    );
                    self.state = DetectorState::Complete;
                } else if self.trailing_silence > ABANDON_SILENCE {
                    tracing::trace!(voiced = self.voiced, "too little voice, discarding");
                    self.reset();
                }
            }
        }

        self.state == DetectorState::Complete
    }

    fn append(&mut self, chunk: &[f32], voiced: bool) {
        self.utterance.extend_from_slice(chunk);
        if voiced {
            self.voiced += chunk.len();
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += chunk.len();
        }
    }

    /// Take the utterance samples and start over
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.utterance);
        self.reset();
        utterance
    }

    #[must_use]
    pub fn in_speech(&self) -> bool {
        self.state == DetectorState::InSpeech
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.utterance.clear();
        self.voiced = 0;
        self.trailing_silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// Root-mean-square level of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
