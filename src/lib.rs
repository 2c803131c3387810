//! Ava - voice customer-service call assistant
//!
//! This library provides the core functionality for an Ava call:
//! - Turn-taking state machine (listen, process, speak)
//! - WAV assembly for streamed PCM from the synthesis service
//! - Call session management with a single active call
//! - Speech capture (microphone + STT, or typed input)
//! - Gemini chat and speech clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation (CLI)                   │
//! │   status watch  │  start / end call  │  Ctrl+C      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   CallManager                        │
//! │  CallController │ TurnMachine │ CallSession │ WAV   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Services                          │
//! │   Mic + STT  │  Gemini chat  │  Gemini TTS  │ cpal  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod call;
pub mod config;
pub mod error;
pub mod gemini;
pub mod persona;
pub mod voice;

pub use audio::{AudioDescriptor, WavBlob, assemble_wav_blob};
pub use call::{CallManager, CallServices, CallStatus, TurnState};
pub use config::Config;
pub use error::{Error, Result};
pub use persona::Persona;
