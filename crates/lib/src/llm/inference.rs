//! Hosted inference API client (Hugging Face style endpoints).
//!
//! Supports two upstream response shapes: a list of generation objects
//! (text-generation endpoint) and a chat-completion envelope. Anything else
//! falls through to the reply placeholder.

use crate::config::{InferenceConfig, PromptStyle};
use crate::llm::ReplyGenerator;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Returned to the user whenever the upstream call or parse fails.
pub const REPLY_PLACEHOLDER: &str =
    "Sorry, I could not come up with a reply just now. Please try again in a moment.";

/// Client for a hosted inference endpoint. One synchronous attempt per reply,
/// no retry; failures degrade to [`REPLY_PLACEHOLDER`].
#[derive(Clone)]
pub struct InferenceClient {
    api_key: Option<String>,
    settings: InferenceConfig,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("inference api error: {0}")]
    Api(String),
    #[error("unrecognized inference response shape")]
    UnrecognizedShape,
}

/// Known upstream response shapes, tried in order; the caller falls back to
/// the placeholder when neither matches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    /// Text-generation endpoint: a list of generations.
    Generations(Vec<Generation>),
    /// Chat-completions envelope.
    Chat(ChatCompletion),
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl InferenceClient {
    pub fn new(api_key: Option<String>, settings: InferenceConfig, client: reqwest::Client) -> Self {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Self {
            api_key,
            settings,
            base_url,
            client,
        }
    }

    /// Wrapped single-turn completion prompt: persona + user utterance + assistant cue.
    fn completion_prompt(&self, user_text: &str) -> String {
        format!(
            "{}\nUser: {}\nAssistant:",
            self.settings.persona.trim(),
            user_text
        )
    }

    /// One inference call. Returns the raw reply text or a typed error; the
    /// `ReplyGenerator` impl is what converts failures to the placeholder.
    pub async fn generate(&self, user_text: &str) -> Result<String, InferenceError> {
        let (url, body) = match self.settings.prompt_style {
            PromptStyle::Completion => (
                format!("{}/models/{}", self.base_url, self.settings.model),
                json!({
                    "inputs": self.completion_prompt(user_text),
                    "parameters": {
                        "max_new_tokens": self.settings.max_tokens,
                        "temperature": self.settings.temperature,
                        "stop": ["User:", "Assistant:"],
                        "return_full_text": false
                    }
                }),
            ),
            PromptStyle::Chat => (
                format!(
                    "{}/models/{}/v1/chat/completions",
                    self.base_url, self.settings.model
                ),
                json!({
                    "model": self.settings.model,
                    "max_tokens": self.settings.max_tokens,
                    "temperature": self.settings.temperature,
                    "messages": [
                        { "role": "system", "content": self.settings.persona },
                        { "role": "user", "content": user_text }
                    ]
                }),
            ),
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(InferenceError::Api(format!("{} {}", status, body)));
        }
        let text = res.text().await?;
        extract_reply(&text).ok_or(InferenceError::UnrecognizedShape)
    }
}

/// Parse an upstream body into the reply text. Empty or unknown shapes => None.
fn extract_reply(body: &str) -> Option<String> {
    let parsed: InferenceResponse = serde_json::from_str(body).ok()?;
    let reply = match parsed {
        InferenceResponse::Generations(gens) => gens.into_iter().next()?.generated_text,
        InferenceResponse::Chat(chat) => chat.choices.into_iter().next()?.message.content,
    };
    let reply = reply.trim();
    if reply.is_empty() {
        None
    } else {
        Some(reply.to_string())
    }
}

#[async_trait]
impl ReplyGenerator for InferenceClient {
    async fn reply(&self, user_text: &str) -> String {
        match self.generate(user_text).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("inference failed, sending placeholder: {}", e);
                REPLY_PLACEHOLDER.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;

    #[test]
    fn parses_generation_list() {
        let body = r#"[{"generated_text": "  Hello there!  "}]"#;
        assert_eq!(extract_reply(body).as_deref(), Some("Hello there!"));
    }

    #[test]
    fn parses_chat_completion_envelope() {
        let body = r#"{
            "id": "cmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}]
        }"#;
        assert_eq!(extract_reply(body).as_deref(), Some("Hi!"));
    }

    #[test]
    fn rejects_malformed_and_empty_bodies() {
        assert_eq!(extract_reply("not json"), None);
        assert_eq!(extract_reply(r#"{"error": "model loading"}"#), None);
        assert_eq!(extract_reply("[]"), None);
        assert_eq!(extract_reply(r#"[{"generated_text": "   "}]"#), None);
        assert_eq!(extract_reply(r#"{"choices": []}"#), None);
    }

    #[test]
    fn completion_prompt_wraps_persona_and_cue() {
        let client = InferenceClient::new(
            None,
            InferenceConfig::default(),
            reqwest::Client::new(),
        );
        let prompt = client.completion_prompt("hi");
        assert_eq!(prompt, "You are a friendly assistant.\nUser: hi\nAssistant:");
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_placeholder() {
        let mut settings = InferenceConfig::default();
        // Reserved TEST-NET address, nothing listens here.
        settings.base_url = "http://192.0.2.1:9".to_string();
        let client = InferenceClient::new(
            None,
            settings,
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(300))
                .build()
                .expect("client"),
        );
        assert_eq!(client.reply("hi").await, REPLY_PLACEHOLDER);
    }
}
