//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parla/config.json`). Every
//! secret can be overridden from the environment (`META_TOKEN`, `HF_API_KEY`,
//! ...), which matches how the gateway is deployed in practice.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// WhatsApp Cloud API settings (token, phone number id, templates).
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Hosted inference endpoint settings (reply generation).
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Contact source (CSV URL) and startup announcement.
    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Image/video generation provider. Optional; the /generate-video route
    /// reports an error when unset.
    #[serde(default)]
    pub media: MediaConfig,

    /// Inbound worker pool sizing.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Timeout applied to every outbound HTTP call, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP server (default 5000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0" — the provider must reach this host).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// WhatsApp Cloud API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    /// Graph API access token. Overridden by META_TOKEN env when set.
    pub token: Option<String>,
    /// Phone number id the messages are sent from. Overridden by PHONE_NUMBER_ID env.
    pub phone_number_id: Option<String>,
    /// Shared secret echoed back during webhook verification. Overridden by VERIFY_TOKEN env.
    #[serde(default = "default_verify_token")]
    pub verify_token: String,
    /// Pre-approved template used for announcements. Overridden by TEMPLATE_NAME env.
    #[serde(default = "default_template_name")]
    pub template_name: String,
    /// Template language code. Overridden by TEMPLATE_LANG env.
    #[serde(default = "default_template_lang")]
    pub template_lang: String,
    /// Graph API base URL (default production; override for tests).
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
}

fn default_verify_token() -> String {
    "testtoken".to_string()
}

fn default_template_name() -> String {
    "hello_world".to_string()
}

fn default_template_lang() -> String {
    "en_US".to_string()
}

fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v22.0".to_string()
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            token: None,
            phone_number_id: None,
            verify_token: default_verify_token(),
            template_name: default_template_name(),
            template_lang: default_template_lang(),
            api_base: default_whatsapp_api_base(),
        }
    }
}

/// How the user utterance is presented to the inference endpoint: a wrapped
/// completion prompt or a structured single-turn chat message list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// "persona + User: ... + Assistant:" completion prompt.
    #[default]
    Completion,
    /// [system, user] chat-completions message list.
    Chat,
}

/// Hosted inference endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// API key for the inference endpoint. Overridden by HF_API_KEY env.
    pub api_key: Option<String>,
    /// Model id (default mistralai/Mistral-7B-Instruct-v0.2).
    #[serde(default = "default_inference_model")]
    pub model: String,
    /// Base URL of the inference API (default Hugging Face; override for tests).
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,
    /// Completion-style or chat-style single-turn prompting.
    #[serde(default)]
    pub prompt_style: PromptStyle,
    /// Token budget for one reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// System persona line prepended to every prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_inference_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.2".to_string()
}

fn default_inference_base_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.7
}

fn default_persona() -> String {
    "You are a friendly assistant.".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_inference_model(),
            base_url: default_inference_base_url(),
            prompt_style: PromptStyle::default(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            persona: default_persona(),
        }
    }
}

/// Contact source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsConfig {
    /// Public CSV URL (e.g. a published Google Sheet). Overridden by CONTACTS_URL env.
    pub url: Option<String>,
    /// Header name of the phone-number column.
    #[serde(default = "default_contacts_column")]
    pub column: String,
    /// When true, fetch contacts and send the announcement template before serving.
    #[serde(default = "default_announce_on_start")]
    pub announce_on_start: bool,
}

fn default_contacts_column() -> String {
    "phone".to_string()
}

fn default_announce_on_start() -> bool {
    true
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            url: None,
            column: default_contacts_column(),
            announce_on_start: default_announce_on_start(),
        }
    }
}

/// Image/video generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfig {
    /// Provider API key. Overridden by MEDIA_API_KEY env. Unset disables the pipeline.
    pub api_key: Option<String>,
    /// Provider base URL.
    pub base_url: Option<String>,
    /// Upper bound of status-poll attempts for one video job.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Delay between status polls, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_attempts() -> u32 {
    20
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            poll_attempts: default_poll_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Inbound worker pool sizing. Webhook POSTs are queued and processed by a
/// fixed number of workers; when the queue is full the event is dropped with
/// a warning (the provider still gets its 200).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkersConfig {
    /// Number of concurrent event processors.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Queue capacity between the webhook route and the pool.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_pool_size() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_nonempty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Graph API token: env META_TOKEN overrides config.
pub fn resolve_meta_token(config: &Config) -> Option<String> {
    env_nonempty("META_TOKEN").or_else(|| config_nonempty(config.whatsapp.token.as_ref()))
}

/// Resolve the sending phone number id: env PHONE_NUMBER_ID overrides config.
pub fn resolve_phone_number_id(config: &Config) -> Option<String> {
    env_nonempty("PHONE_NUMBER_ID")
        .or_else(|| config_nonempty(config.whatsapp.phone_number_id.as_ref()))
}

/// Resolve the webhook verification token: env VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> String {
    env_nonempty("VERIFY_TOKEN").unwrap_or_else(|| config.whatsapp.verify_token.clone())
}

/// Resolve the announcement template name: env TEMPLATE_NAME overrides config.
pub fn resolve_template_name(config: &Config) -> String {
    env_nonempty("TEMPLATE_NAME").unwrap_or_else(|| config.whatsapp.template_name.clone())
}

/// Resolve the announcement template language: env TEMPLATE_LANG overrides config.
pub fn resolve_template_lang(config: &Config) -> String {
    env_nonempty("TEMPLATE_LANG").unwrap_or_else(|| config.whatsapp.template_lang.clone())
}

/// Resolve the inference API key: env HF_API_KEY overrides config.
pub fn resolve_inference_api_key(config: &Config) -> Option<String> {
    env_nonempty("HF_API_KEY").or_else(|| config_nonempty(config.inference.api_key.as_ref()))
}

/// Resolve the contact source URL: env CONTACTS_URL overrides config.
pub fn resolve_contacts_url(config: &Config) -> Option<String> {
    env_nonempty("CONTACTS_URL").or_else(|| config_nonempty(config.contacts.url.as_ref()))
}

/// Resolve the media provider API key: env MEDIA_API_KEY overrides config.
pub fn resolve_media_api_key(config: &Config) -> Option<String> {
    env_nonempty("MEDIA_API_KEY").or_else(|| config_nonempty(config.media.api_key.as_ref()))
}

/// Resolve config path from env or default (~/.parla/config.json).
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".parla").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or PARLA_CONFIG_PATH). Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 5000);
        assert_eq!(g.bind, "0.0.0.0");
    }

    #[test]
    fn defaults_match_provider_conventions() {
        let c = Config::default();
        assert_eq!(c.whatsapp.verify_token, "testtoken");
        assert_eq!(c.whatsapp.template_name, "hello_world");
        assert_eq!(c.whatsapp.template_lang, "en_US");
        assert_eq!(c.contacts.column, "phone");
        assert_eq!(c.media.poll_attempts, 20);
        assert_eq!(c.media.poll_interval_secs, 5);
        assert_eq!(c.inference.max_tokens, 256);
        assert_eq!(c.inference.prompt_style, PromptStyle::Completion);
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = serde_json::from_str(
            r#"{
                "gateway": { "port": 8080 },
                "whatsapp": { "token": "t", "phoneNumberId": "123" },
                "inference": { "promptStyle": "chat" },
                "contacts": { "url": "https://example.com/c.csv", "announceOnStart": false }
            }"#,
        )
        .expect("parse config");
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "0.0.0.0");
        assert_eq!(c.whatsapp.token.as_deref(), Some("t"));
        assert_eq!(c.whatsapp.phone_number_id.as_deref(), Some("123"));
        assert_eq!(c.inference.prompt_style, PromptStyle::Chat);
        assert!(!c.contacts.announce_on_start);
        assert_eq!(c.contacts.url.as_deref(), Some("https://example.com/c.csv"));
    }

    #[test]
    fn resolve_trims_and_rejects_empty() {
        let mut c = Config::default();
        c.whatsapp.token = Some("  abc  ".to_string());
        assert_eq!(resolve_meta_token(&c).as_deref(), Some("abc"));
        c.whatsapp.token = Some("   ".to_string());
        assert_eq!(resolve_meta_token(&c), None);
    }
}
