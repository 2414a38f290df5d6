//! Reply generation against a hosted inference endpoint.
//!
//! One single-turn prompt in, one best-effort reply string out. The
//! `ReplyGenerator` trait is the seam the gateway depends on; tests
//! substitute a stub.

mod inference;

pub use inference::{InferenceClient, InferenceError, REPLY_PLACEHOLDER};

use async_trait::async_trait;

/// Produces a reply for one user utterance. Infallible by contract: an
/// upstream failure degrades to a placeholder string, never an error.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn reply(&self, user_text: &str) -> String;
}
