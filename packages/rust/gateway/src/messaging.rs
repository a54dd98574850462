//! Client for the outbound messaging gateway.

use reqwest::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use courier_shared::{CourierError, Result, SendReceipt};

/// Send endpoint on the messaging gateway.
const SEND_PATH: &str = "/internal/messages/send";

/// Delivers prepared follow-up messages through the messaging gateway.
pub struct MessageGateway {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl MessageGateway {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            api_token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Send the prepared message to `phone`.
    ///
    /// The gateway is the source of truth on delivery: a 2xx response that
    /// does not confirm the send (or carries no message id) is escalated as
    /// a retryable 502, never treated as silent success.
    pub async fn send(&self, contact_id: &str, phone: &str, message: &str) -> Result<SendReceipt> {
        let url = self
            .base_url
            .join(SEND_PATH)
            .map_err(|e| CourierError::config(format!("bad gateway URL: {e}")))?;

        let mut request = self.client.post(url).json(&json!({
            "contactId": contact_id,
            "phone": phone,
            "message": message,
        }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::api_status(
                status.as_u16(),
                format!("gateway send failed: HTTP {status}"),
            ));
        }

        let receipt: SendReceipt = response.json().await?;
        if !receipt.confirmed || receipt.message_id.is_none() {
            return Err(CourierError::api_status(
                502,
                "gateway did not confirm send (confirmed=false)",
            ));
        }

        debug!(
            contact_id,
            message_id = receipt.message_id.as_deref(),
            "gateway confirmed send"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gateway_for(server: &MockServer) -> MessageGateway {
        let base = Url::parse(&server.uri()).expect("server uri");
        MessageGateway::new(crate::build_client().expect("client"), base)
    }

    #[tokio::test]
    async fn confirmed_send_returns_receipt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(
                json!({"contactId": "c-1", "phone": "+5511999"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "confirmed": true,
                "messageId": "wamid-42",
                "sentAt": "2024-05-01T12:00:00Z"
            })))
            .mount(&server)
            .await;

        let receipt = gateway_for(&server)
            .send("c-1", "+5511999", "oi")
            .await
            .expect("send");

        assert_eq!(receipt.message_id.as_deref(), Some("wamid-42"));
        assert!(receipt.confirmed);
    }

    #[tokio::test]
    async fn unconfirmed_send_is_retryable_502() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"confirmed": false})),
            )
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .send("c-1", "+5511999", "oi")
            .await
            .expect_err("must fail");

        assert_eq!(err.status(), Some(502));
        assert!(crate::retry::is_transient(&err));
    }

    #[tokio::test]
    async fn gateway_error_status_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .send("c-1", "+5511999", "oi")
            .await
            .expect_err("must fail");

        assert_eq!(err.status(), Some(500));
    }
}
