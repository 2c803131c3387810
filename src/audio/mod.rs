//! Audio container handling
//!
//! Wraps synthesized PCM in WAV for playback and encodes captured speech
//! for transcription uploads.

mod wav;

pub use wav::{
    AudioDescriptor, DEFAULT_BITS_PER_SAMPLE, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE,
    WAV_HEADER_LEN, WavBlob, assemble_wav_blob, build_wav_header, decode_base64,
    parse_audio_descriptor, samples_to_wav,
};
