//! Webhook gateway: HTTP server, verification, and inbound processing.

mod server;

pub use server::{run_gateway, GatewayState};
