//! Automated-agent bridge.
//!
//! The automated agent is an opaque turn-based text service: one request,
//! one reply. When an upstream endpoint is configured the reply comes from
//! there; otherwise a canned acknowledgement keeps the automated phase
//! functional (and deterministic in tests).

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    conversation_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpstreamReply {
    reply: String,
}

#[derive(Clone)]
pub enum Responder {
    /// POST the customer message to an upstream agent service
    Http { client: reqwest::Client, endpoint: String },
    /// Fixed acknowledgement; used when no upstream is configured
    Canned,
}

impl Responder {
    pub fn from_endpoint(endpoint: Option<String>) -> Self {
        match endpoint {
            Some(endpoint) => Responder::Http {
                client: reqwest::Client::new(),
                endpoint,
            },
            None => Responder::Canned,
        }
    }

    pub async fn reply(&self, conversation_id: &str, message: &str) -> anyhow::Result<String> {
        match self {
            Responder::Http { client, endpoint } => {
                let response = client
                    .post(endpoint)
                    .json(&UpstreamRequest {
                        conversation_id,
                        message,
                    })
                    .send()
                    .await?
                    .error_for_status()?;
                let body: UpstreamReply = response.json().await?;
                debug!(
                    component = "responder",
                    event = "responder.reply",
                    conversation_id = conversation_id,
                    "Upstream agent replied"
                );
                Ok(body.reply)
            }
            Responder::Canned => Ok(
                "Thanks for reaching out! I'm an automated assistant — ask me anything, \
                 or request a human operator at any time."
                    .to_string(),
            ),
        }
    }
}
