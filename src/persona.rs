//! Persona configuration
//!
//! A persona is the assistant's identity plus the business knowledge it
//! answers from: a product catalog and an FAQ document. The default persona
//! is compiled into the binary; a JSON file of the same shape replaces it.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::call::TurnSettings;
use crate::{Error, Result};

/// Embedded default persona
const EMBEDDED_PERSONA: &str = include_str!("../personas/ava.json");

/// Assistant identity and knowledge
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Semantic version of this persona file
    pub version: String,

    /// Core identity
    pub identity: Identity,

    /// Voice preferences
    #[serde(default)]
    pub voice: Voice,

    /// Fixed call utterances
    pub call: CallScript,

    /// Behavior and communication style
    pub personality: Personality,

    /// Product catalog and FAQ
    #[serde(default)]
    pub knowledge: Knowledge,
}

/// Core identity of the assistant
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase
    pub tagline: Option<String>,
}

/// Voice preferences
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Prebuilt synthesis voice (e.g. "Charon")
    pub tts_voice: Option<String>,

    /// Recognition language (BCP 47 code)
    pub language: Option<String>,
}

/// Utterances spoken without asking the model
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallScript {
    /// Spoken when a call starts
    pub greeting: String,

    /// Spoken when the model fails or returns nothing
    pub fallback_reply: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// Opening of the system instruction
    pub system_prompt: String,

    /// Key guidelines, appended as a bullet list
    #[serde(default)]
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Knowledge {
    #[serde(default)]
    pub products: Vec<Product>,

    #[serde(default)]
    pub faq: Vec<FaqEntry>,
}

/// One catalog entry; serialized verbatim into the system instruction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

impl Persona {
    /// The persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded JSON is invalid
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_PERSONA)
    }

    /// Parse a persona from JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Persona` if the JSON does not match the schema or
    /// required text is blank
    pub fn from_json(json: &str) -> Result<Self> {
        let persona: Self = serde_json::from_str(json)
            .map_err(|e| Error::Persona(format!("invalid persona: {e}")))?;
        persona.validate()?;
        Ok(persona)
    }

    /// Load a persona from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Persona(format!("failed to read {}: {e}", path.display()))
        })?;
        let persona = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), persona_id = persona.id(), "loaded persona");
        Ok(persona)
    }

    /// Load from `path` if given, otherwise use the embedded persona
    ///
    /// # Errors
    ///
    /// Returns error if the chosen persona cannot be loaded
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let persona = Self::embedded()?;
                tracing::debug!(persona_id = persona.id(), "using embedded persona");
                Ok(persona)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("identity.id", &self.identity.id),
            ("call.greeting", &self.call.greeting),
            ("call.fallbackReply", &self.call.fallback_reply),
            ("personality.systemPrompt", &self.personality.system_prompt),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Persona(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.call.greeting
    }

    #[must_use]
    pub fn fallback_reply(&self) -> &str {
        &self.call.fallback_reply
    }

    /// Preferred synthesis voice
    #[must_use]
    pub fn tts_voice(&self) -> Option<&str> {
        self.voice.tts_voice.as_deref()
    }

    /// Preferred recognition language
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.voice.language.as_deref()
    }

    /// Product catalog as compact JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn products_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.knowledge.products)?)
    }

    /// FAQ as a question/answer document
    #[must_use]
    pub fn faq_document(&self) -> String {
        self.knowledge
            .faq
            .iter()
            .map(|entry| format!("سوال: {}\nپاسخ: {}", entry.question, entry.answer))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Full system instruction for the conversational model
    ///
    /// # Errors
    ///
    /// Returns error if the product catalog cannot be serialized
    pub fn system_instruction(&self) -> Result<String> {
        let mut instruction = self.personality.system_prompt.trim().to_string();

        instruction.push_str("\n\nاز اطلاعات زیر برای پاسخ به سوالات مشتریان استفاده کنید:\n");
        let _ = write!(
            instruction,
            "۱. اطلاعات محصولات (در قالب JSON):\n{}\n\n۲. سوالات متداول (FAQ):\n{}\n",
            self.products_json()?,
            self.faq_document(),
        );

        if !self.personality.guidelines.is_empty() {
            instruction.push_str("\nدستورالعمل‌های کلیدی:\n");
            for guideline in &self.personality.guidelines {
                let _ = writeln!(instruction, "- {guideline}");
            }
        }

        Ok(instruction.trim_end().to_string())
    }

    /// Call settings with this persona's greeting and fallback
    #[must_use]
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            greeting: self.call.greeting.clone(),
            fallback_reply: self.call.fallback_reply.clone(),
            ..TurnSettings::default()
        }
    }
}
