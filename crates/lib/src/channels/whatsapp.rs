//! WhatsApp channel: sendMessage via the Cloud API and webhook envelope types.

use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use serde::Deserialize;

/// WhatsApp Cloud API connector: sends text and template messages from one
/// phone number id. Response status and body are always logged; callers treat
/// a failed send as a log-only event (no retry, no delivery verification).
pub struct WhatsAppChannel {
    id: String,
    token: Option<String>,
    phone_number_id: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(
        token: Option<String>,
        phone_number_id: Option<String>,
        api_base: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id: "whatsapp".to_string(),
            token,
            phone_number_id,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn messages_url(&self) -> Result<String, String> {
        let phone_id = self
            .phone_number_id
            .as_ref()
            .ok_or("whatsapp phone number id not configured")?;
        Ok(format!("{}/{}/messages", self.api_base, phone_id))
    }

    /// POST one message payload to the Cloud API. Logs status and body;
    /// non-2xx is returned as an error string for the caller to log.
    async fn post_message(&self, to: &str, payload: serde_json::Value) -> Result<(), String> {
        let token = self.token.as_ref().ok_or("whatsapp token not configured")?;
        let url = self.messages_url()?;
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        log::info!("whatsapp send to {}: {} {}", to, status, body);
        if !status.is_success() {
            return Err(format!("send failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Send a free-text message.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), String> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body }
        });
        self.post_message(to, payload).await
    }

    /// Send a pre-approved template message by name + language code.
    pub async fn send_template(&self, to: &str, name: &str, lang: &str) -> Result<(), String> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": { "name": name, "language": { "code": lang } }
        });
        self.post_message(to, payload).await
    }
}

#[async_trait]
impl ChannelHandle for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<(), String> {
        WhatsAppChannel::send_text(self, to, body).await
    }

    async fn send_template(&self, to: &str, name: &str, lang: &str) -> Result<(), String> {
        WhatsAppChannel::send_template(self, to, name, lang).await
    }
}

/// Webhook event envelope (Cloud API POST body). Every level defaults so an
/// absent path deserializes to empty rather than failing.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

/// Change payload: either delivery-status echoes or inbound messages.
#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Option<Vec<WaMessage>>,
    #[serde(default)]
    pub statuses: Option<serde_json::Value>,
}

/// One inbound message. Only `type == "text"` messages are answered.
#[derive(Debug, Default, Deserialize)]
pub struct WaMessage {
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WaTextBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaTextBody {
    #[serde(default)]
    pub body: String,
}

/// Navigate the envelope to the first actionable text message.
///
/// Looks only at `entry[0].changes[0].value`: a `statuses` field means a
/// delivery receipt (no reply), and only the first message is consulted.
/// Returns `(sender, text)` or `None` when there is nothing to answer.
pub fn extract_text_message(event: &WebhookEvent) -> Option<(String, String)> {
    let value = &event.entry.first()?.changes.first()?.value;
    if value.statuses.is_some() {
        return None;
    }
    let msg = value.messages.as_ref()?.first()?;
    if msg.kind != "text" {
        return None;
    }
    let body = msg.text.as_ref()?.body.clone();
    Some((msg.from.clone(), body))
}
