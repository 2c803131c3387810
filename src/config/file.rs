//! TOML configuration file loading
//!
//! Supports `~/.config/ava/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvaConfigFile {
    /// Path to a persona JSON file
    #[serde(default)]
    pub persona: Option<PathBuf>,

    #[serde(default)]
    pub gemini: GeminiFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub call: CallFileConfig,
}

/// Conversational model and synthesis
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Chat model (e.g. "gemini-2.5-flash")
    pub chat_model: Option<String>,
    /// Synthesis model (e.g. "gemini-2.5-flash-preview-tts")
    pub tts_model: Option<String>,
    /// Prebuilt voice (e.g. "Charon")
    pub voice: Option<String>,
}

/// Speech recognition
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    /// BCP 47 code (e.g. "fa-IR")
    pub language: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
}

/// Call timing
#[derive(Debug, Default, Deserialize)]
pub struct CallFileConfig {
    pub reply_timeout_secs: Option<u64>,
    pub speech_timeout_secs: Option<u64>,
    pub listen_timeout_secs: Option<u64>,
}

/// Load an explicitly requested config file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file(path: &Path) -> Result<AvaConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load the config file from the standard path
///
/// Returns `AvaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_default_config_file() -> AvaConfigFile {
    let Some(path) = config_file_path() else {
        return AvaConfigFile::default();
    };

    if !path.exists() {
        return AvaConfigFile::default();
    }

    match load_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            AvaConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ava/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ava").join("config.toml"))
}
