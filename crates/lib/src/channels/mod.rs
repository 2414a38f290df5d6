//! Messaging channels (WhatsApp Cloud API).
//!
//! Channel trait and registry so the gateway can route outbound sends, plus
//! the inbound webhook envelope types. Inbound events are queued for the
//! worker pool; replies go back out through a registered channel handle.

mod inbound;
mod registry;
mod whatsapp;

pub use inbound::InboundEvent;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use whatsapp::{
    extract_text_message, ChangeValue, WaMessage, WaTextBody, WebhookChange, WebhookEntry,
    WebhookEvent, WhatsAppChannel,
};
