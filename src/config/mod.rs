//! Configuration management for Ava
//!
//! Precedence is env > TOML file > persona preferences > built-in defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use self::file::AvaConfigFile;
use crate::call::TurnSettings;
use crate::gemini::DEFAULT_BASE_URL;
use crate::voice::SttProvider;
use crate::{Error, Persona, Result};

pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_TTS_VOICE: &str = "Charon";
pub const DEFAULT_LANGUAGE: &str = "fa-IR";

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SPEECH_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(8);

/// Ava configuration
#[derive(Debug)]
pub struct Config {
    /// Conversational model and synthesis
    pub gemini: GeminiConfig,

    /// Speech recognition
    pub stt: SttConfig,

    /// Call timing
    pub call: CallConfig,

    /// Persona JSON file; the embedded persona when unset
    pub persona_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct GeminiConfig {
    /// From `GEMINI_API_KEY` or `API_KEY`
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub chat_model: String,
    pub tts_model: String,
    /// Overrides the persona's voice
    pub voice: Option<String>,
}

#[derive(Debug)]
pub struct SttConfig {
    pub provider: SttProvider,
    /// Provider default when unset
    pub model: Option<String>,
    /// Overrides the persona's language
    pub language: Option<String>,
    pub openai_api_key: Option<SecretString>,
    pub deepgram_api_key: Option<SecretString>,
}

#[derive(Debug, Clone, Copy)]
pub struct CallConfig {
    /// Upper bound on one model reply
    pub reply_timeout: Duration,
    /// Upper bound on one synthesis response
    pub speech_timeout: Duration,
    /// How long one listening span waits for speech to start
    pub listen_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment and a TOML file
    ///
    /// An explicit `path` must exist and parse; the default path is optional.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit config file cannot be loaded or a value
    /// is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::load_config_file(path)?,
            None => file::load_default_config_file(),
        };
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown STT provider
    pub fn from_sources(
        fc: AvaConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let gemini = GeminiConfig {
            api_key: env("GEMINI_API_KEY")
                .or_else(|| env("API_KEY"))
                .or(fc.gemini.api_key)
                .map(SecretString::from),
            base_url: env("AVA_GEMINI_URL")
                .or(fc.gemini.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: env("AVA_CHAT_MODEL")
                .or(fc.gemini.chat_model)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            tts_model: env("AVA_TTS_MODEL")
                .or(fc.gemini.tts_model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            voice: env("AVA_TTS_VOICE").or(fc.gemini.voice),
        };

        let provider = match env("AVA_STT_PROVIDER").or(fc.stt.provider) {
            Some(name) => SttProvider::parse(&name)
                .ok_or_else(|| Error::Config(format!("unknown STT provider: {name}")))?,
            None => SttProvider::default(),
        };

        let stt = SttConfig {
            provider,
            model: env("AVA_STT_MODEL").or(fc.stt.model),
            language: env("AVA_LANGUAGE").or(fc.stt.language),
            openai_api_key: env("OPENAI_API_KEY")
                .or(fc.stt.openai_api_key)
                .map(SecretString::from),
            deepgram_api_key: env("DEEPGRAM_API_KEY")
                .or(fc.stt.deepgram_api_key)
                .map(SecretString::from),
        };

        let secs = |key: &str, file_value: Option<u64>, default: Duration| {
            env(key)
                .and_then(|v| match v.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Some(secs),
                    _ => {
                        tracing::warn!(key, value = %v, "ignoring invalid timeout");
                        None
                    }
                })
                .or(file_value.filter(|s| *s > 0))
                .map_or(default, Duration::from_secs)
        };

        let call = CallConfig {
            reply_timeout: secs(
                "AVA_REPLY_TIMEOUT_SECS",
                fc.call.reply_timeout_secs,
                DEFAULT_REPLY_TIMEOUT,
            ),
            speech_timeout: secs(
                "AVA_SPEECH_TIMEOUT_SECS",
                fc.call.speech_timeout_secs,
                DEFAULT_SPEECH_TIMEOUT,
            ),
            listen_timeout: secs(
                "AVA_LISTEN_TIMEOUT_SECS",
                fc.call.listen_timeout_secs,
                DEFAULT_LISTEN_TIMEOUT,
            ),
        };

        let persona_path = env("AVA_PERSONA_PATH").map(PathBuf::from).or(fc.persona);

        Ok(Self {
            gemini,
            stt,
            call,
            persona_path,
        })
    }

    /// Load the configured persona
    ///
    /// # Errors
    ///
    /// Returns error if the persona file cannot be loaded
    pub fn persona(&self) -> Result<Persona> {
        Persona::resolve(self.persona_path.as_deref())
    }

    /// Gemini API key
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no key is configured
    pub fn gemini_api_key(&self) -> Result<SecretString> {
        self.gemini.api_key.clone().ok_or_else(|| {
            Error::Config("GEMINI_API_KEY (or API_KEY) is not set".to_string())
        })
    }

    /// API key for the configured STT provider
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the provider's key is missing
    pub fn stt_api_key(&self) -> Result<SecretString> {
        let (key, var) = match self.stt.provider {
            SttProvider::Whisper => (&self.stt.openai_api_key, "OPENAI_API_KEY"),
            SttProvider::Deepgram => (&self.stt.deepgram_api_key, "DEEPGRAM_API_KEY"),
        };
        key.clone()
            .ok_or_else(|| Error::Config(format!("{var} is not set")))
    }

    #[must_use]
    pub fn stt_model(&self) -> String {
        self.stt
            .model
            .clone()
            .unwrap_or_else(|| self.stt.provider.default_model().to_string())
    }

    /// Voice: config, then persona, then default
    #[must_use]
    pub fn tts_voice(&self, persona: &Persona) -> String {
        self.gemini
            .voice
            .as_deref()
            .or_else(|| persona.tts_voice())
            .unwrap_or(DEFAULT_TTS_VOICE)
            .to_string()
    }

    /// Language: config, then persona, then default
    #[must_use]
    pub fn language(&self, persona: &Persona) -> String {
        self.stt
            .language
            .as_deref()
            .or_else(|| persona.language())
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string()
    }

    /// Call settings for `persona` with the configured timeouts
    #[must_use]
    pub fn turn_settings(&self, persona: &Persona) -> TurnSettings {
        TurnSettings {
            reply_timeout: self.call.reply_timeout,
            speech_timeout: self.call.speech_timeout,
            ..persona.turn_settings()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(AvaConfigFile::default(), env(&[])).unwrap();

        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.gemini.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.gemini.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.gemini.tts_model, DEFAULT_TTS_MODEL);
        assert_eq!(config.stt.provider, SttProvider::Whisper);
        assert_eq!(config.stt_model(), "whisper-1");
        assert_eq!(config.call.reply_timeout, Duration::from_secs(30));
        assert_eq!(config.call.speech_timeout, Duration::from_secs(60));
        assert_eq!(config.call.listen_timeout, Duration::from_secs(8));
        assert!(config.gemini_api_key().is_err());
    }

    #[test]
    fn test_env_over_file_over_default() {
        let fc: AvaConfigFile = toml::from_str(
            r#"
            [gemini]
            chat_model = "file-model"
            voice = "Puck"

            [call]
            reply_timeout_secs = 12
            speech_timeout_secs = 40
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env(&[("AVA_CHAT_MODEL", "env-model"), ("AVA_REPLY_TIMEOUT_SECS", "5")]),
        )
        .unwrap();

        assert_eq!(config.gemini.chat_model, "env-model");
        assert_eq!(config.gemini.voice.as_deref(), Some("Puck"));
        assert_eq!(config.call.reply_timeout, Duration::from_secs(5));
        assert_eq!(config.call.speech_timeout, Duration::from_secs(40));
    }

    #[test]
    fn test_api_key_fallback_var() {
        let config = Config::from_sources(AvaConfigFile::default(), env(&[("API_KEY", "abc")]))
            .unwrap();
        assert_eq!(config.gemini_api_key().unwrap().expose_secret(), "abc");

        let config = Config::from_sources(
            AvaConfigFile::default(),
            env(&[("API_KEY", "abc"), ("GEMINI_API_KEY", "primary")]),
        )
        .unwrap();
        assert_eq!(config.gemini_api_key().unwrap().expose_secret(), "primary");
    }

    #[test]
    fn test_invalid_timeout_ignored() {
        let config = Config::from_sources(
            AvaConfigFile::default(),
            env(&[("AVA_SPEECH_TIMEOUT_SECS", "soon"), ("AVA_LISTEN_TIMEOUT_SECS", "0")]),
        )
        .unwrap();
        assert_eq!(config.call.speech_timeout, Duration::from_secs(60));
        assert_eq!(config.call.listen_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_unknown_stt_provider() {
        let result =
            Config::from_sources(AvaConfigFile::default(), env(&[("AVA_STT_PROVIDER", "azure")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_stt_key_follows_provider() {
        let config = Config::from_sources(
            AvaConfigFile::default(),
            env(&[("AVA_STT_PROVIDER", "deepgram"), ("OPENAI_API_KEY", "sk")]),
        )
        .unwrap();
        assert!(config.stt_api_key().is_err());
        assert_eq!(config.stt_model(), "nova-2");
    }

    #[test]
    fn test_persona_preferences_fill_gaps() {
        let persona = Persona::embedded().unwrap();

        let config = Config::from_sources(AvaConfigFile::default(), env(&[])).unwrap();
        assert_eq!(config.tts_voice(&persona), "Charon");
        assert_eq!(config.language(&persona), "fa-IR");

        let config = Config::from_sources(
            AvaConfigFile::default(),
            env(&[("AVA_TTS_VOICE", "Kore"), ("AVA_LANGUAGE", "en-US")]),
        )
        .unwrap();
        assert_eq!(config.tts_voice(&persona), "Kore");
        assert_eq!(config.language(&persona), "en-US");
    }

    #[test]
    fn test_turn_settings_carry_timeouts() {
        let persona = Persona::embedded().unwrap();
        let config = Config::from_sources(
            AvaConfigFile::default(),
            env(&[("AVA_REPLY_TIMEOUT_SECS", "7")]),
        )
        .unwrap();

        let settings = config.turn_settings(&persona);
        assert_eq!(settings.reply_timeout, Duration::from_secs(7));
        assert_eq!(settings.greeting, persona.greeting());
    }
}
