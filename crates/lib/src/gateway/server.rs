//! Webhook HTTP server: verification, inbound dispatch, and the media route.

use crate::channels::{
    extract_text_message, ChannelRegistry, InboundEvent, WebhookEvent, WhatsAppChannel,
};
use crate::config::{self, Config};
use crate::contacts;
use crate::llm::{InferenceClient, ReplyGenerator};
use crate::media::{CancelFlag, MediaPipeline};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Fixed body returned on webhook verification mismatch.
const INVALID_TOKEN_BODY: &str = "Invalid token";

/// Channel id the incoming processor replies through.
const REPLY_CHANNEL: &str = "whatsapp";

/// Shared state for the webhook server (config, channels, reply generation).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Expected `hub.verify_token` value for webhook setup.
    pub verify_token: String,
    pub channel_registry: Arc<ChannelRegistry>,
    pub reply_generator: Arc<dyn ReplyGenerator>,
    /// Present only when a media provider is configured.
    pub media: Option<Arc<MediaPipeline>>,
    /// Bounded queue feeding the worker pool. Full queue => event dropped.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
}

/// Compare the caller-supplied token against the configured secret; echo the
/// challenge on match. Pure so verification is unit-testable.
fn verify_challenge(
    token: Option<&str>,
    challenge: Option<&str>,
    expected: &str,
) -> Option<String> {
    let token = token?;
    let challenge = challenge?;
    if token == expected {
        Some(challenge.to_string())
    } else {
        None
    }
}

/// Process one inbound webhook event end to end. Every failure is logged and
/// swallowed: the provider already received its acknowledgment, so there is
/// no caller to propagate to.
async fn process_event(state: GatewayState, event: InboundEvent) {
    let parsed: WebhookEvent = match serde_json::from_value(event.body) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("ignoring unparseable webhook body: {}", e);
            return;
        }
    };
    let Some((sender, text)) = extract_text_message(&parsed) else {
        log::debug!("ignoring webhook event with no actionable text message");
        return;
    };
    log::info!("[customer {}]: {}", sender, text);
    let reply = state.reply_generator.reply(&text).await;
    let Some(channel) = state.channel_registry.get(REPLY_CHANNEL).await else {
        log::warn!("no '{}' channel registered, dropping reply", REPLY_CHANNEL);
        return;
    };
    if let Err(e) = channel.send_text(&sender, &reply).await {
        log::warn!("reply to {} failed: {}", sender, e);
    }
}

/// Spawn the fixed-size worker pool over the inbound queue. Workers share
/// one receiver; each event is processed by exactly one worker.
fn spawn_workers(
    state: GatewayState,
    rx: mpsc::Receiver<InboundEvent>,
    pool_size: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    (0..pool_size.max(1))
        .map(|i| {
            let state = state.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let event = { rx.lock().await.recv().await };
                    match event {
                        Some(event) => process_event(state.clone(), event).await,
                        None => break,
                    }
                }
                log::debug!("inbound worker {} stopped", i);
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook — provider setup handshake: echo the challenge when the
/// supplied token matches, else 403 with a fixed body. Safely repeatable.
async fn verify_webhook(
    State(state): State<GatewayState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match verify_challenge(
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        &state.verify_token,
    ) {
        Some(challenge) => {
            log::info!("webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => (StatusCode::FORBIDDEN, INVALID_TOKEN_BODY).into_response(),
    }
}

/// POST /webhook — queue the raw body for the worker pool and acknowledge
/// immediately. The 200 never reflects processing outcome: an unparseable
/// body is dropped with a log line, and a full queue drops the event with a
/// warning.
async fn receive_webhook(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Json<serde_json::Value> {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(body) => match state.inbound_tx.try_send(InboundEvent { body }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("inbound queue full, dropping webhook event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("inbound queue closed, dropping webhook event");
            }
        },
        Err(e) => log::debug!("ignoring non-JSON webhook body: {}", e),
    }
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct GenerateVideoForm {
    #[serde(default)]
    prompt: String,
}

/// POST /generate-video — run the media pipeline for a prompt. Pipeline
/// failures (including timeout) are reported in the JSON body, not as an
/// HTTP error.
async fn generate_video(
    State(state): State<GatewayState>,
    Form(form): Form<GenerateVideoForm>,
) -> Json<serde_json::Value> {
    let Some(ref pipeline) = state.media else {
        return Json(json!({ "error": "media provider not configured" }));
    };
    if form.prompt.trim().is_empty() {
        return Json(json!({ "error": "prompt is required" }));
    }
    match pipeline.generate_video(form.prompt.trim(), &CancelFlag::new()).await {
        Ok(url) => Json(json!({ "video_url": url })),
        Err(e) => {
            log::warn!("video generation failed: {}", e);
            Json(json!({ "error": e.to_string() }))
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "port": state.config.gateway.port,
    }))
}

/// Build the axum router over the shared state.
fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/generate-video", post(generate_video))
        .with_state(state)
}

/// Run the webhook server; binds to config.gateway.bind:config.gateway.port.
/// When configured, the startup announcement runs before the listener binds.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("building http client")?;

    let meta_token = config::resolve_meta_token(&config);
    let phone_number_id = config::resolve_phone_number_id(&config);
    if meta_token.is_none() || phone_number_id.is_none() {
        log::warn!("whatsapp token or phone number id not set; outbound sends will fail");
    }
    let whatsapp = Arc::new(WhatsAppChannel::new(
        meta_token,
        phone_number_id,
        config.whatsapp.api_base.clone(),
        client.clone(),
    ));

    let inference = InferenceClient::new(
        config::resolve_inference_api_key(&config),
        config.inference.clone(),
        client.clone(),
    );

    let media = match (
        config::resolve_media_api_key(&config),
        config.media.base_url.clone(),
    ) {
        (Some(key), Some(base)) => Some(Arc::new(MediaPipeline::new(
            key,
            base,
            config.media.poll_attempts,
            Duration::from_secs(config.media.poll_interval_secs),
            client.clone(),
        ))),
        _ => {
            log::debug!("media provider not configured, /generate-video disabled");
            None
        }
    };

    // Startup announcement: fetch contacts fresh, send, discard. A missing
    // or broken source never fails startup.
    if config.contacts.announce_on_start {
        if let Some(url) = config::resolve_contacts_url(&config) {
            match contacts::fetch_contacts(&client, &url, &config.contacts.column).await {
                Ok(list) => {
                    contacts::announce(
                        whatsapp.as_ref(),
                        &list,
                        &config::resolve_template_name(&config),
                        &config::resolve_template_lang(&config),
                    )
                    .await;
                }
                Err(e) => log::warn!("could not load contacts: {}", e),
            }
        }
    }

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(config.workers.queue_capacity.max(1));
    let state = GatewayState {
        config: Arc::new(config.clone()),
        verify_token: config::resolve_verify_token(&config),
        channel_registry: Arc::new(ChannelRegistry::new()),
        reply_generator: Arc::new(inference),
        media,
        inbound_tx,
    };
    state
        .channel_registry
        .register(REPLY_CHANNEL.to_string(), whatsapp)
        .await;
    let workers = spawn_workers(state.clone(), inbound_rx, config.workers.pool_size);
    log::info!("started {} inbound worker(s)", workers.len());

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook server listening on {}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited")?;
    log::info!("webhook server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn verify_echoes_challenge_on_match() {
        assert_eq!(
            verify_challenge(Some("secret"), Some("c-123"), "secret").as_deref(),
            Some("c-123")
        );
    }

    #[test]
    fn verify_rejects_mismatch_and_missing_params() {
        assert_eq!(verify_challenge(Some("wrong"), Some("c-123"), "secret"), None);
        assert_eq!(verify_challenge(None, Some("c-123"), "secret"), None);
        assert_eq!(verify_challenge(Some("secret"), None, "secret"), None);
    }

    /// Records the order of generator and sender invocations.
    #[derive(Default)]
    struct CallLog {
        calls: Mutex<Vec<String>>,
    }

    impl CallLog {
        fn push(&self, entry: String) {
            self.calls.lock().expect("call log lock").push(entry);
        }

        fn take(&self) -> Vec<String> {
            self.calls.lock().expect("call log lock").clone()
        }
    }

    struct StubGenerator {
        log: Arc<CallLog>,
    }

    #[async_trait]
    impl ReplyGenerator for StubGenerator {
        async fn reply(&self, user_text: &str) -> String {
            self.log.push(format!("reply:{}", user_text));
            "stub reply".to_string()
        }
    }

    struct RecordingChannel {
        log: Arc<CallLog>,
    }

    #[async_trait]
    impl ChannelHandle for RecordingChannel {
        fn id(&self) -> &str {
            "whatsapp"
        }

        async fn send_text(&self, to: &str, body: &str) -> Result<(), String> {
            self.log.push(format!("send:{}:{}", to, body));
            Ok(())
        }

        async fn send_template(&self, to: &str, name: &str, _lang: &str) -> Result<(), String> {
            self.log.push(format!("template:{}:{}", to, name));
            Ok(())
        }
    }

    async fn test_state(log: Arc<CallLog>) -> GatewayState {
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let state = GatewayState {
            config: Arc::new(Config::default()),
            verify_token: "secret".to_string(),
            channel_registry: Arc::new(ChannelRegistry::new()),
            reply_generator: Arc::new(StubGenerator { log: log.clone() }),
            media: None,
            inbound_tx,
        };
        state
            .channel_registry
            .register(
                REPLY_CHANNEL.to_string(),
                Arc::new(RecordingChannel { log }),
            )
            .await;
        state
    }

    fn event(body: &str) -> InboundEvent {
        InboundEvent {
            body: serde_json::from_str(body).expect("parse event body"),
        }
    }

    #[tokio::test]
    async fn text_message_generates_then_sends_exactly_once() {
        let log = Arc::new(CallLog::default());
        let state = test_state(log.clone()).await;
        process_event(
            state,
            event(
                r#"{"entry":[{"changes":[{"value":{"messages":[{"from":"15551234567","type":"text","text":{"body":"hi"}}]}}]}]}"#,
            ),
        )
        .await;
        assert_eq!(
            log.take(),
            vec![
                "reply:hi".to_string(),
                "send:15551234567:stub reply".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn status_event_sends_nothing() {
        let log = Arc::new(CallLog::default());
        let state = test_state(log.clone()).await;
        process_event(
            state,
            event(r#"{"entry":[{"changes":[{"value":{"statuses":[{"status":"sent"}]}}]}]}"#),
        )
        .await;
        assert!(log.take().is_empty());
    }

    #[tokio::test]
    async fn full_queue_still_acknowledges_every_post() {
        let log = Arc::new(CallLog::default());
        // Capacity 1 and no workers draining: every post after the first
        // overflows and is dropped.
        let (inbound_tx, mut inbound_rx) = mpsc::channel(1);
        let state = GatewayState {
            config: Arc::new(Config::default()),
            verify_token: "secret".to_string(),
            channel_registry: Arc::new(ChannelRegistry::new()),
            reply_generator: Arc::new(StubGenerator { log }),
            media: None,
            inbound_tx,
        };
        let body = br#"{"entry":[{"changes":[{"value":{}}]}]}"#;
        for _ in 0..5 {
            let ack = receive_webhook(State(state.clone()), Bytes::from_static(body)).await;
            assert_eq!(ack.0, json!({ "status": "ok" }));
        }
        // Exactly one event made it into the queue; the other four were dropped.
        assert!(inbound_rx.try_recv().is_ok());
        assert!(inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_event_is_swallowed() {
        let log = Arc::new(CallLog::default());
        let state = test_state(log.clone()).await;
        process_event(state, event(r#"{"entry": "not-a-list"}"#)).await;
        assert!(log.take().is_empty());
    }
}
