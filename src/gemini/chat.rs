//! Conversational model over Gemini

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::{Content, GeminiClient, GenerateRequest};
use crate::call::{ChatModel, Conversation, TextStream};
use crate::{Error, Result};

/// Opens Gemini conversations for one chat model
#[derive(Debug, Clone)]
pub struct GeminiChat {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiChat {
    #[must_use]
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl ChatModel for GeminiChat {
    fn open_conversation(&self, system_instruction: &str) -> Box<dyn Conversation> {
        tracing::debug!(model = %self.model, "opening conversation");
        Box::new(GeminiConversation {
            client: Arc::clone(&self.client),
            model: self.model.clone(),
            system_instruction: Content::text(system_instruction),
            history: Vec::new(),
        })
    }
}

/// Dialogue history for one call
///
/// The API is stateless, so every request carries the system instruction
/// and the full history.
#[derive(Debug)]
pub struct GeminiConversation {
    client: Arc<GeminiClient>,
    model: String,
    system_instruction: Content,
    history: Vec<Content>,
}

impl GeminiConversation {
    fn request_for(&self, message: &str) -> GenerateRequest {
        let mut contents = Vec::with_capacity(self.history.len() + 1);
        contents.extend(self.history.iter().cloned());
        contents.push(Content::user(message));

        GenerateRequest {
            contents,
            system_instruction: Some(self.system_instruction.clone()),
            generation_config: None,
        }
    }
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send(&mut self, message: &str) -> Result<TextStream> {
        let request = self.request_for(message);
        let responses = self
            .client
            .stream_generate(&self.model, &request, Error::ModelQuery)
            .await?;

        Ok(responses.map(|chunk| chunk.map(|r| r.text())).boxed())
    }

    fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history.push(Content::user(message));
        self.history.push(Content::model(reply));
    }

    fn turns(&self) -> usize {
        self.history.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn conversation() -> Box<dyn Conversation> {
        let client = GeminiClient::new(
            SecretString::from("test-key".to_string()),
            super::super::DEFAULT_BASE_URL,
        )
        .unwrap();
        GeminiChat::new(Arc::new(client), "gemini-2.5-flash").open_conversation("instruction")
    }

    #[test]
    fn test_history_grows_per_exchange() {
        let mut conv = conversation();
        assert_eq!(conv.turns(), 0);

        conv.record_exchange("سلام", "سلام، آوا هستم.");
        conv.record_exchange("ساعات کاری؟", "شنبه تا چهارشنبه");
        assert_eq!(conv.turns(), 2);
    }

    #[test]
    fn test_request_carries_history() {
        let client =
            GeminiClient::new(SecretString::from("k".to_string()), "http://localhost").unwrap();
        let mut conv = GeminiConversation {
            client: Arc::new(client),
            model: "m".to_string(),
            system_instruction: Content::text("sys"),
            history: Vec::new(),
        };
        conv.record_exchange("first", "reply");

        let request = conv.request_for("second");
        let roles: Vec<_> = request
            .contents
            .iter()
            .map(|c| c.role.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(request.contents[2].parts[0].text.as_deref(), Some("second"));
        assert_eq!(request.system_instruction, Some(Content::text("sys")));
    }
}
