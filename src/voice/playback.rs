//! Audio playback
//!
//! [`SpeakerOutput`] plays clips on the default output device,
//! [`FileOutput`] writes them to disk instead.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;

use super::AudioOutput;
use crate::audio::WavBlob;
use crate::{Error, Result};

/// How often a playing stream checks for completion or halt
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tail allowed after the last sample so the device drains
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Plays mono samples to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Whether the host has an output device at all
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    /// Open the default output device at `sample_rate`
    ///
    /// Prefers mono, falls back to stereo with the sample duplicated.
    ///
    /// # Errors
    ///
    /// Returns error if no device supports the rate
    pub fn new(sample_rate: u32) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| {
                Error::Audio(format!("no output config supports {sample_rate} Hz"))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play samples, blocking until done, `halt` is raised or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_blocking(
        &self,
        samples: Vec<f32>,
        halt: &AtomicBool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let halted = || halt.load(Ordering::SeqCst) || cancel.is_cancelled();
        if samples.is_empty() || halted() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels).max(1);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            pos = (pos + 1).min(samples.len());
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        #[allow(clippy::cast_precision_loss)]
        let clip_len = Duration::from_secs_f64(
            sample_count as f64 / f64::from(self.config.sample_rate.0),
        );
        let deadline = Instant::now() + clip_len + Duration::from_millis(500);

        while !finished.load(Ordering::Relaxed) {
            if halted() {
                tracing::debug!(
                    played = position.load(Ordering::Relaxed),
                    total = sample_count,
                    "playback halted"
                );
                return Ok(());
            }
            if Instant::now() > deadline {
                tracing::warn!("playback did not report completion, stopping");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        std::thread::sleep(DRAIN_DELAY);
        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Speaker output; one clip at a time
#[derive(Default)]
pub struct SpeakerOutput {
    /// Halt flag of the clip currently playing
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl SpeakerOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Halt the current clip and register a fresh flag for the next one
    fn arm(&self) -> Arc<AtomicBool> {
        let halt = Arc::new(AtomicBool::new(false));
        if let Ok(mut current) = self.current.lock()
            && let Some(previous) = current.replace(Arc::clone(&halt))
        {
            previous.store(true, Ordering::SeqCst);
        }
        halt
    }
}

#[async_trait]
impl AudioOutput for SpeakerOutput {
    async fn play(&self, clip: WavBlob, cancel: CancellationToken) -> Result<()> {
        let samples = clip.to_samples()?;
        let sample_rate = clip.descriptor().sample_rate;
        let halt = self.arm();

        // A stop that landed before `arm` missed this clip's flag
        if cancel.is_cancelled() {
            tracing::debug!("call ended before playback started");
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            AudioPlayback::new(sample_rate)?.play_blocking(samples, &halt, &cancel)
        })
        .await
        .map_err(|e| Error::Audio(e.to_string()))?
    }

    fn stop(&self) {
        if let Ok(current) = self.current.lock()
            && let Some(halt) = current.as_ref()
        {
            halt.store(true, Ordering::SeqCst);
        }
    }
}

/// Writes each clip to `reply-NNNN.wav` in a directory
pub struct FileOutput {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl FileOutput {
    /// Create the output directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            counter: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioOutput for FileOutput {
    async fn play(&self, clip: WavBlob, cancel: CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("reply-{n:04}.wav"));

        tokio::fs::write(&path, clip.as_bytes()).await?;
        tracing::info!(
            path = %path.display(),
            duration_ms = clip.duration().as_millis(),
            "reply saved"
        );
        Ok(())
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioDescriptor;

    #[tokio::test]
    async fn test_file_output_numbers_clips() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new(dir.path().join("replies")).unwrap();
        let clip = WavBlob::from_pcm(&[0, 0, 1, 0], AudioDescriptor::default()).unwrap();

        output.play(clip.clone(), CancellationToken::new()).await.unwrap();
        output.play(clip.clone(), CancellationToken::new()).await.unwrap();

        let first = std::fs::read(output.dir().join("reply-0001.wav")).unwrap();
        assert_eq!(first, clip.as_bytes());
        assert!(output.dir().join("reply-0002.wav").exists());

        let ended = CancellationToken::new();
        ended.cancel();
        output.play(clip, ended).await.unwrap();
        assert!(!output.dir().join("reply-0003.wav").exists());
    }

    #[tokio::test]
    async fn test_speaker_skips_clip_after_cancel() {
        // Stop raced ahead of arm: no flag was registered when it ran
        let output = SpeakerOutput::new();
        output.stop();

        let ended = CancellationToken::new();
        ended.cancel();
        let clip = WavBlob::from_pcm(&[0, 0, 1, 0], AudioDescriptor::default()).unwrap();

        // Returns before touching any output device
        output.play(clip, ended).await.unwrap();
    }

    #[test]
    fn test_arm_halts_previous_clip() {
        let output = SpeakerOutput::new();
        let first = output.arm();
        let second = output.arm();

        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));

        output.stop();
        assert!(second.load(Ordering::SeqCst));
    }
}
