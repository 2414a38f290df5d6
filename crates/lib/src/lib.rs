//! parla core library — config, WhatsApp channel, reply generation,
//! contacts, media pipeline, and the webhook gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod contacts;
pub mod gateway;
pub mod llm;
pub mod media;
