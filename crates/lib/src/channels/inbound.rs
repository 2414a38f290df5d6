//! Inbound webhook event: queued for the worker pool as the raw JSON body.
//!
//! The body is kept unparsed until a worker picks it up; the webhook route
//! only acknowledges receipt.

/// One inbound webhook delivery awaiting processing.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub body: serde_json::Value,
}
