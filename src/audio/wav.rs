//! Raw PCM to WAV container encoding
//!
//! The synthesis service returns headerless linear PCM described by a MIME
//! type such as `audio/L16;rate=24000`. Playback needs a RIFF/WAVE file, so
//! the payload is wrapped in a canonical 44-byte PCM header.

use std::time::Duration;

use base64::Engine;

use crate::{Error, Result};

/// Size of the canonical RIFF/WAVE PCM header
pub const WAV_HEADER_LEN: usize = 44;

/// Default channel count (the MIME type never carries one)
pub const DEFAULT_CHANNELS: u16 = 1;

/// Default sample rate when the MIME type has no usable `rate`
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Default bits per sample when the MIME type is not `audio/L<N>`
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// PCM format tag in the `fmt ` chunk
const FORMAT_PCM: u16 = 1;

/// Size of the `fmt ` chunk body for plain PCM
const FMT_CHUNK_LEN: u32 = 16;

/// Layout of a raw PCM payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDescriptor {
    pub num_channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl Default for AudioDescriptor {
    fn default() -> Self {
        Self {
            num_channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
        }
    }
}

impl AudioDescriptor {
    /// Parse from a MIME type, see [`parse_audio_descriptor`]
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        parse_audio_descriptor(mime_type)
    }

    /// Bytes per sample frame across all channels, saturating at `u16::MAX`
    #[must_use]
    pub const fn block_align(&self) -> u16 {
        self.num_channels.saturating_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second of audio, saturating at `u32::MAX`
    #[must_use]
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate
            .saturating_mul(u32::from(self.num_channels))
            .saturating_mul(u32::from(self.bits_per_sample) / 8)
    }

    /// Whether the header fields can be computed without saturating
    fn fits_header(&self) -> bool {
        let frame = u32::from(self.num_channels) * (u32::from(self.bits_per_sample) / 8);
        u16::try_from(frame).is_ok() && self.sample_rate.checked_mul(frame).is_some()
    }
}

/// Parse an `audio/L<bits>;rate=<hz>` MIME type
///
/// Never fails: anything missing or unparseable degrades to the defaults
/// (16 bits, 24000 Hz). The channel count is always the default. A rate too
/// large for the header's 32-bit byte rate also falls back to the default.
#[must_use]
pub fn parse_audio_descriptor(mime_type: &str) -> AudioDescriptor {
    let mut descriptor = AudioDescriptor::default();
    let mut parts = mime_type.split(';').map(str::trim);

    if let Some(bits) = parts
        .next()
        .and_then(|primary| primary.strip_prefix("audio/L"))
    {
        match bits.parse::<u16>() {
            Ok(n) if n > 0 => descriptor.bits_per_sample = n,
            _ => tracing::warn!(mime_type, "could not parse bits per sample, using default"),
        }
    }

    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim() == "rate" {
            match value.trim().parse::<u32>() {
                Ok(rate) if rate > 0 => descriptor.sample_rate = rate,
                _ => tracing::warn!(param, "could not parse sample rate, using default"),
            }
        }
    }

    if !descriptor.fits_header() {
        tracing::warn!(mime_type, "sample rate overflows the header byte rate, using default");
        descriptor.sample_rate = DEFAULT_SAMPLE_RATE;
    }

    descriptor
}

/// Build the 44-byte RIFF/WAVE header for `data_len` bytes of PCM
#[must_use]
pub fn build_wav_header(data_len: u32, descriptor: &AudioDescriptor) -> [u8; WAV_HEADER_LEN] {
    let mut header = [0u8; WAV_HEADER_LEN];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&data_len.saturating_add(36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&descriptor.num_channels.to_le_bytes());
    header[24..28].copy_from_slice(&descriptor.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&descriptor.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&descriptor.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&descriptor.bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());

    header
}

/// Decode standard base64
///
/// # Errors
///
/// Returns `Error::InvalidEncoding` on malformed input
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?)
}

/// Decode a base64 PCM payload and wrap it in a WAV container
///
/// # Errors
///
/// Returns `Error::InvalidEncoding` if the payload is not valid base64
pub fn assemble_wav_blob(base64_payload: &str, mime_type: &str) -> Result<WavBlob> {
    let pcm = decode_base64(base64_payload)?;
    WavBlob::from_pcm(&pcm, parse_audio_descriptor(mime_type))
}

/// An immutable, playable WAV file (header + PCM)
#[derive(Clone, PartialEq, Eq)]
pub struct WavBlob {
    bytes: Vec<u8>,
    descriptor: AudioDescriptor,
}

impl std::fmt::Debug for WavBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavBlob")
            .field("descriptor", &self.descriptor)
            .field("data_len", &self.data_len())
            .finish()
    }
}

impl WavBlob {
    /// Wrap raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns error if the payload does not fit in a 32-bit RIFF size
    pub fn from_pcm(pcm: &[u8], descriptor: AudioDescriptor) -> Result<Self> {
        let data_len = u32::try_from(pcm.len())
            .ok()
            .filter(|len| len.checked_add(36).is_some())
            .ok_or_else(|| Error::Audio(format!("PCM payload too large: {} bytes", pcm.len())))?;

        let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
        bytes.extend_from_slice(&build_wav_header(data_len, &descriptor));
        bytes.extend_from_slice(pcm);

        Ok(Self { bytes, descriptor })
    }

    /// The full file contents
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the file contents
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The PCM payload following the header
    #[must_use]
    pub fn pcm(&self) -> &[u8] {
        &self.bytes[WAV_HEADER_LEN..]
    }

    /// Length of the PCM payload in bytes
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.bytes.len() - WAV_HEADER_LEN
    }

    #[must_use]
    pub const fn descriptor(&self) -> AudioDescriptor {
        self.descriptor
    }

    /// Playback duration implied by the header
    #[must_use]
    pub fn duration(&self) -> Duration {
        let byte_rate = u64::from(self.descriptor.byte_rate());
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.data_len() as u64 * 1000 / byte_rate)
    }

    /// Decode to interleaved f32 samples in [-1.0, 1.0]
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be read back
    pub fn to_samples(&self) -> Result<Vec<f32>> {
        let mut reader = hound::WavReader::new(std::io::Cursor::new(self.bytes.as_slice()))
            .map_err(|e| Error::Audio(e.to_string()))?;
        let spec = reader.spec();

        match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string())),
            hound::SampleFormat::Int => {
                #[allow(clippy::cast_precision_loss)]
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                #[allow(clippy::cast_precision_loss)]
                let samples = reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::Audio(e.to_string()));
                samples
            }
        }
    }
}

/// Convert f32 samples to 16-bit mono WAV bytes for transcription uploads
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
