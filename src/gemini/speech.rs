//! Speech synthesis over Gemini

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use super::{Content, GeminiClient, GenerateRequest, GenerateResponse, GenerationConfig};
use crate::call::{AudioFragment, AudioStream, SpeechSynthesizer};
use crate::{Error, Result};

/// Text-to-speech with a prebuilt Gemini voice
#[derive(Debug, Clone)]
pub struct GeminiSpeech {
    client: Arc<GeminiClient>,
    model: String,
    voice: String,
}

impl GeminiSpeech {
    #[must_use]
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn request_for(&self, text: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content::user(text)],
            system_instruction: None,
            generation_config: Some(GenerationConfig::audio(&self.voice)),
        }
    }
}

/// Audio fragments carried by one response chunk
fn fragments(response: &GenerateResponse) -> Vec<AudioFragment> {
    response
        .inline_data()
        .map(|inline| AudioFragment {
            data: inline.data.clone(),
            mime_type: inline.mime_type.clone(),
        })
        .collect()
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        tracing::debug!(model = %self.model, voice = %self.voice, chars = text.chars().count(), "synthesizing");

        let request = self.request_for(text);
        let responses = self
            .client
            .stream_generate(&self.model, &request, Error::Synthesis)
            .await?;

        Ok(responses
            .flat_map(|chunk| {
                let items: Vec<Result<AudioFragment>> = match chunk {
                    Ok(response) => fragments(&response).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed())
    }
}
