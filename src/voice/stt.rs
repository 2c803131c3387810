//! Speech-to-text for recorded utterances
//!
//! One WAV upload per utterance to Whisper or Deepgram. Every failure,
//! transport or provider, surfaces as `Error::Recognition`.

use std::fmt::Display;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    /// Best alternative of the first channel
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|channel| channel.alternatives.into_iter().next())
            .map(|alternative| alternative.transcript)
            .unwrap_or_default()
    }
}

/// Transcription backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

impl SttProvider {
    /// Parse a provider name, case-insensitively
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Some(Self::Whisper),
            "deepgram" => Some(Self::Deepgram),
            _ => None,
        }
    }

    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Deepgram => "deepgram",
        }
    }
}

/// Transcribes recorded utterances to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: String,
    provider: SttProvider,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// `language` is a BCP 47 tag such as `fa-IR`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is empty
    pub fn new(
        provider: SttProvider,
        api_key: SecretString,
        model: String,
        language: String,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!(
                "{} API key required for speech recognition",
                provider.as_str()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
            provider,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Transcribe one WAV utterance; the result is trimmed and may be empty
    ///
    /// # Errors
    ///
    /// Returns `Error::Recognition` if the request fails or the provider
    /// rejects it
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(
            provider = self.provider.as_str(),
            audio_bytes = wav.len(),
            "transcribing utterance"
        );

        let request = match self.provider {
            SttProvider::Whisper => self.whisper_request(wav)?,
            SttProvider::Deepgram => self.deepgram_request(wav),
        };
        let response = request.send().await.map_err(|e| self.failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("{status}: {body}")));
        }

        let transcript = match self.provider {
            SttProvider::Whisper => response.json::<WhisperResponse>().await.map(|r| r.text),
            SttProvider::Deepgram => response
                .json::<DeepgramResponse>()
                .await
                .map(DeepgramResponse::into_transcript),
        }
        .map_err(|e| self.failure(e))?;

        let transcript = transcript.trim().to_string();
        tracing::debug!(%transcript, "transcription complete");
        Ok(transcript)
    }

    fn whisper_request(&self, wav: &[u8]) -> Result<reqwest::RequestBuilder> {
        let file = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| self.failure(e))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language_code().to_string());

        Ok(self
            .client
            .post(WHISPER_URL)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form))
    }

    fn deepgram_request(&self, wav: &[u8]) -> reqwest::RequestBuilder {
        self.client
            .post(DEEPGRAM_URL)
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("punctuate", "true"),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav.to_vec())
    }

    /// Whisper takes an ISO 639-1 code rather than a full tag
    fn language_code(&self) -> &str {
        self.language
            .split(['-', '_'])
            .next()
            .unwrap_or(&self.language)
    }

    fn failure(&self, detail: impl Display) -> Error {
        tracing::warn!(provider = self.provider.as_str(), error = %detail, "transcription failed");
        Error::Recognition(format!("{}: {detail}", self.provider.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stt(language: &str) -> SpeechToText {
        SpeechToText::new(
            SttProvider::Whisper,
            SecretString::from("sk-test".to_string()),
            "whisper-1".to_string(),
            language.to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(SttProvider::parse("Deepgram"), Some(SttProvider::Deepgram));
        assert_eq!(SttProvider::parse(" whisper "), Some(SttProvider::Whisper));
        assert_eq!(SttProvider::parse("openai"), Some(SttProvider::Whisper));
        assert_eq!(SttProvider::parse("azure"), None);
    }

    #[test]
    fn test_language_code() {
        assert_eq!(stt("fa-IR").language_code(), "fa");
        assert_eq!(stt("pt_BR").language_code(), "pt");
        assert_eq!(stt("en").language_code(), "en");
    }

    #[test]
    fn test_blank_key_rejected() {
        let result = SpeechToText::new(
            SttProvider::Deepgram,
            SecretString::from("  ".to_string()),
            "nova-2".to_string(),
            "fa".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_deepgram_transcript_extraction() {
        let response: DeepgramResponse = serde_json::from_str(
            r#"{"results":{"channels":[{"alternatives":[
                {"transcript":"سلام","confidence":0.98},
                {"transcript":"سلامت","confidence":0.4}
            ]}]}}"#,
        )
        .unwrap();
        assert_eq!(response.into_transcript(), "سلام");

        let empty: DeepgramResponse =
            serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(empty.into_transcript(), "");
    }

    #[test]
    fn test_failures_are_recognition_errors() {
        let err = stt("fa-IR").failure("503 Service Unavailable");
        assert!(matches!(err, Error::Recognition(ref msg) if msg.starts_with("whisper: 503")));
    }
}
