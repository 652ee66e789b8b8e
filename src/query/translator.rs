//! Question to SQL translation through a chat-completions model.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Secret;

/// Turns a natural-language question into candidate SQL.
///
/// Implementations never fail loudly: any problem is logged and reported as
/// `None`.
pub trait SqlTranslator: Send + Sync {
    fn translate(&self, question: &str) -> impl Future<Output = Option<String>> + Send;
}

/// Fixed system instructions sent with every question.
#[derive(Debug, Clone)]
pub struct InstructionTemplate {
    text: String,
}

impl InstructionTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read the template once; later edits need a restart.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        debug!("Loaded instruction template from {} ({} bytes)", path.display(), text.len());
        Ok(Self::new(text))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub api_key: Secret,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum TranslateError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    NoChoices,
    EmptyContent,
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::Http(e) => write!(f, "HTTP error: {}", e),
            TranslateError::Status { status, body } => {
                write!(f, "Model service returned {}: {}", status, body)
            }
            TranslateError::NoChoices => write!(f, "Model returned no choices"),
            TranslateError::EmptyContent => write!(f, "Model returned empty content"),
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<reqwest::Error> for TranslateError {
    fn from(e: reqwest::Error) -> Self {
        TranslateError::Http(e)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Translator backed by the Mistral chat-completions API (or any
/// OpenAI-compatible endpoint).
pub struct MistralTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
    template: InstructionTemplate,
}

impl MistralTranslator {
    pub fn new(config: TranslatorConfig, template: InstructionTemplate) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            template,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, question: &str) -> Result<String, TranslateError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: self.template.as_str(),
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key.expose()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let choice = reply.choices.into_iter().next().ok_or(TranslateError::NoChoices)?;
        let content = choice.message.content.unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            return Err(TranslateError::EmptyContent);
        }
        Ok(content.to_string())
    }
}

impl SqlTranslator for MistralTranslator {
    async fn translate(&self, question: &str) -> Option<String> {
        match self.complete(question).await {
            Ok(sql) => Some(sql),
            Err(e) => {
                error!("LLM error: {}", e);
                None
            }
        }
    }
}
