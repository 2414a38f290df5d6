//! Integration test: start the webhook server on a free port and exercise
//! verification and inbound acknowledgment over real HTTP. No WhatsApp,
//! inference, or media provider is required; the server task is left running
//! when the test ends.

use lib::config::Config;
use lib::gateway;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.whatsapp.verify_token = "it-secret".to_string();
    // No contact source, no announcement: startup must not block on either.
    config.contacts.announce_on_start = false;
    config
}

async fn wait_until_up(client: &reqwest::Client, base: &str) {
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {} did not come up within 5s", base);
}

#[tokio::test]
async fn webhook_verification_and_acknowledgment() {
    let port = free_port();
    let config = test_config(port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    wait_until_up(&client, &base).await;

    // Health probe.
    let resp = client.get(format!("{}/", base)).send().await.expect("health");
    let json: serde_json::Value = resp.json().await.expect("health json");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));

    // Verification: matching token echoes the challenge exactly.
    let resp = client
        .get(format!(
            "{}/webhook?hub.verify_token=it-secret&hub.challenge=c-42",
            base
        ))
        .send()
        .await
        .expect("verify");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.expect("challenge body"), "c-42");

    // Verification: mismatch is a 403 with the fixed non-challenge body.
    let resp = client
        .get(format!(
            "{}/webhook?hub.verify_token=wrong&hub.challenge=c-42",
            base
        ))
        .send()
        .await
        .expect("verify mismatch");
    assert_eq!(resp.status().as_u16(), 403);
    assert_eq!(resp.text().await.expect("error body"), "Invalid token");

    // Inbound status event: acknowledged immediately, no reply attempted.
    let resp = client
        .post(format!("{}/webhook", base))
        .json(&serde_json::json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "delivered" }] } }] }]
        }))
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.expect("ack json");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));

    // Even a non-JSON body is acknowledged; the event is just dropped.
    let resp = client
        .post(format!("{}/webhook", base))
        .body("not json")
        .send()
        .await
        .expect("post junk body");
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.expect("ack json");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));

    // /generate-video without a configured provider reports an error body,
    // still over a 200.
    let resp = client
        .post(format!("{}/generate-video", base))
        .form(&[("prompt", "a red fox")])
        .send()
        .await
        .expect("post generate-video");
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.expect("video json");
    assert!(json.get("error").is_some());
}
