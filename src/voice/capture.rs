//! Microphone input
//!
//! The `cpal` callback downmixes each buffer to mono and hands it over a
//! bounded channel. A slow consumer loses chunks rather than stalling the
//! audio thread.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Capture rate expected by the endpoint detector and transcription
pub const SAMPLE_RATE: u32 = 16000;

/// Callback buffers held before new ones are dropped (a few seconds of audio)
const CHUNK_BACKLOG: usize = 256;

/// Mono sample source on the default input device
///
/// Holds a `cpal` stream, so it must stay on the thread that created it.
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    chunks: Option<Receiver<Vec<f32>>>,
}

impl AudioCapture {
    /// Whether the host has an input device at all
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Open the default input device at [`SAMPLE_RATE`]
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot run at 16kHz
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;
        let config = pick_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            stream: None,
            chunks: None,
        })
    }

    /// Start the input stream; a no-op if already running
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = sync_channel(CHUNK_BACKLOG);
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    forward(&tx, downmix(data, channels));
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        self.stream = Some(stream);
        self.chunks = Some(rx);
        tracing::debug!("microphone started");
        Ok(())
    }

    /// Stop the stream and drop any unread audio
    pub fn stop(&mut self) {
        self.chunks = None;
        if self.stream.take().is_some() {
            tracing::debug!("microphone stopped");
        }
    }

    /// Wait up to `wait` for the next chunk
    #[must_use]
    pub fn next_chunk(&self, wait: Duration) -> Option<Vec<f32>> {
        let chunks = self.chunks.as_ref()?;
        match chunks.recv_timeout(wait) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything captured since the last read
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.chunks
            .as_ref()
            .map(|chunks| chunks.try_iter().flatten().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The supported config at 16kHz with the fewest channels
fn pick_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    let supports_rate =
        |c: &SupportedStreamConfigRange| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate;

    device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(supports_rate)
        .min_by_key(SupportedStreamConfigRange::channels)
        .map(|range| range.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio("microphone does not support 16kHz capture".to_string()))
}

fn forward(tx: &SyncSender<Vec<f32>>, chunk: Vec<f32>) {
    match tx.try_send(chunk) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => tracing::trace!("capture backlog full, chunk dropped"),
    }
}

/// Average interleaved frames down to one channel
#[allow(clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
