//! Server transport.
//!
//! The widget-facing slice of the HTTP API behind a trait, so the agent's
//! loops are testable against a scripted transport. The real implementation
//! carries the tenant credential as a bearer token on every request — no
//! session cookie is assumed.

use thiserror::Error;

use switchboard_protocol::{
    ContactCaptureRequest, ConversationMessageRequest, ConversationMessageResponse, ErrorBody,
    EscalateRequest, EscalateResponse, HistoryResponse, LedgerMessage, PollMessagesResponse,
    SendMessageRequest, SendMessageResponse, StatusResponse,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the request with a machine-readable code
    #[error("{code}: {message}")]
    Api { code: String, message: String },
}

impl TransportError {
    pub fn code(&self) -> Option<&str> {
        match self {
            TransportError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn conversation_message(
        &self,
        request: &ConversationMessageRequest,
    ) -> Result<ConversationMessageResponse, TransportError>;

    async fn escalate(&self, request: &EscalateRequest)
        -> Result<EscalateResponse, TransportError>;

    async fn capture_contact(
        &self,
        handoff_id: &str,
        request: &ContactCaptureRequest,
    ) -> Result<(), TransportError>;

    async fn send_message(
        &self,
        handoff_id: &str,
        body: &str,
    ) -> Result<LedgerMessage, TransportError>;

    async fn resolve(&self, handoff_id: &str) -> Result<(), TransportError>;

    async fn poll_messages(
        &self,
        handoff_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<LedgerMessage>, TransportError>;

    async fn status(&self, handoff_id: &str) -> Result<StatusResponse, TransportError>;

    async fn history(
        &self,
        conversation_id: &str,
        handoff_id: Option<&str>,
    ) -> Result<HistoryResponse, TransportError>;
}

/// HTTP transport against a Switchboard server
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    tenant_key: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, tenant_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_key: tenant_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            // The server always sends a JSON error body; fall back to the
            // status code when it doesn't arrive intact.
            let status = response.status();
            match response.json::<ErrorBody>().await {
                Ok(body) => Err(TransportError::Api {
                    code: body.error,
                    message: body.message,
                }),
                Err(_) => Err(TransportError::Api {
                    code: "http_error".to_string(),
                    message: format!("unexpected status {status}"),
                }),
            }
        }
    }
}

impl Transport for HttpTransport {
    async fn conversation_message(
        &self,
        request: &ConversationMessageRequest,
    ) -> Result<ConversationMessageResponse, TransportError> {
        let response = self
            .client
            .post(self.url("/api/conversation/message"))
            .bearer_auth(&self.tenant_key)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn escalate(
        &self,
        request: &EscalateRequest,
    ) -> Result<EscalateResponse, TransportError> {
        let response = self
            .client
            .post(self.url("/api/handoff/escalate"))
            .bearer_auth(&self.tenant_key)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn capture_contact(
        &self,
        handoff_id: &str,
        request: &ContactCaptureRequest,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(&format!("/api/handoff/{handoff_id}/contact")))
            .bearer_auth(&self.tenant_key)
            .json(request)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        handoff_id: &str,
        body: &str,
    ) -> Result<LedgerMessage, TransportError> {
        let response = self
            .client
            .post(self.url(&format!("/api/handoff/{handoff_id}/message")))
            .bearer_auth(&self.tenant_key)
            .json(&SendMessageRequest {
                body: body.to_string(),
            })
            .send()
            .await?;
        let body: SendMessageResponse = Self::decode(response).await?;
        Ok(body.message)
    }

    async fn resolve(&self, handoff_id: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(&format!("/api/handoff/{handoff_id}/resolve")))
            .bearer_auth(&self.tenant_key)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn poll_messages(
        &self,
        handoff_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<LedgerMessage>, TransportError> {
        let mut request = self
            .client
            .get(self.url(&format!("/api/handoff/{handoff_id}/messages")))
            .bearer_auth(&self.tenant_key);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }
        let body: PollMessagesResponse = Self::decode(request.send().await?).await?;
        Ok(body.messages)
    }

    async fn status(&self, handoff_id: &str) -> Result<StatusResponse, TransportError> {
        let response = self
            .client
            .get(self.url(&format!("/api/handoff/{handoff_id}/status")))
            .bearer_auth(&self.tenant_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn history(
        &self,
        conversation_id: &str,
        handoff_id: Option<&str>,
    ) -> Result<HistoryResponse, TransportError> {
        let mut request = self
            .client
            .get(self.url(&format!("/api/conversation/{conversation_id}/history")))
            .bearer_auth(&self.tenant_key);
        if let Some(handoff_id) = handoff_id {
            request = request.query(&[("handoff_id", handoff_id)]);
        }
        Self::decode(request.send().await?).await
    }
}
