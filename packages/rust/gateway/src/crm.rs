//! CRM client: contact search, conversation listing, private notes, and
//! contact attribute patches.
//!
//! Endpoints follow the Chatwoot application API shape. All list responses
//! go through the normalizer, so envelope drift across CRM versions does
//! not break parsing.

use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use url::Url;

use courier_shared::{Conversation, CourierError, CrmContact, Result};

use crate::normalize;

/// Header carrying the CRM access token.
const TOKEN_HEADER: &str = "api_access_token";

/// Client for the CRM's application API, scoped to one account.
pub struct CrmClient {
    client: Client,
    base_url: Url,
    account_id: u64,
    api_token: Option<String>,
}

impl CrmClient {
    pub fn new(client: Client, base_url: Url, account_id: u64) -> Self {
        Self {
            client,
            base_url,
            account_id,
            api_token: None,
        }
    }

    /// Attach the access token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn url(&self, suffix: &str) -> Result<Url> {
        let path = format!("/api/v1/accounts/{}/{suffix}", self.account_id);
        self.base_url
            .join(&path)
            .map_err(|e| CourierError::config(format!("bad CRM URL: {e}")))
    }

    async fn execute(&self, mut request: RequestBuilder, action: &str) -> Result<Value> {
        if let Some(token) = &self.api_token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::api_status(
                status.as_u16(),
                format!("{action} failed: HTTP {status}"),
            ));
        }

        Ok(response.json().await?)
    }

    /// Search contacts by phone number or identifier.
    pub async fn search_contacts(&self, query: &str) -> Result<Vec<CrmContact>> {
        let url = self.url("contacts/search")?;
        let body = self
            .execute(self.client.get(url).query(&[("q", query)]), "contact search")
            .await?;

        let contacts: Vec<CrmContact> = normalize::extract_contacts(&body)
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(contact) => Some(contact),
                Err(e) => {
                    warn!(error = %e, "dropping unparsable contact from search result");
                    None
                }
            })
            .collect();

        debug!(query, count = contacts.len(), "contact search complete");
        Ok(contacts)
    }

    /// List a contact's conversations.
    pub async fn list_conversations(&self, contact_id: i64) -> Result<Vec<Conversation>> {
        let url = self.url(&format!("contacts/{contact_id}/conversations"))?;
        let body = self
            .execute(self.client.get(url), "conversation listing")
            .await?;

        let conversations: Vec<Conversation> = normalize::extract_conversations(&body)
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(conversation) => Some(conversation),
                Err(e) => {
                    warn!(error = %e, "dropping unparsable conversation");
                    None
                }
            })
            .collect();

        debug!(contact_id, count = conversations.len(), "conversations listed");
        Ok(conversations)
    }

    /// Post a private note into a conversation.
    pub async fn post_note(&self, conversation_id: i64, content: &str) -> Result<()> {
        let url = self.url(&format!("conversations/{conversation_id}/messages"))?;
        self.execute(
            self.client.post(url).json(&json!({
                "content": content,
                "message_type": "outgoing",
                "private": true,
            })),
            "note post",
        )
        .await?;
        Ok(())
    }

    /// Replace a contact's custom attributes.
    pub async fn patch_contact(
        &self,
        contact_id: i64,
        custom_attributes: &Map<String, Value>,
    ) -> Result<()> {
        let url = self.url(&format!("contacts/{contact_id}"))?;
        self.execute(
            self.client
                .patch(url)
                .json(&json!({ "custom_attributes": custom_attributes })),
            "contact patch",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn crm_for(server: &MockServer) -> CrmClient {
        let base = Url::parse(&server.uri()).expect("server uri");
        CrmClient::new(crate::build_client().expect("client"), base, 1).with_token("tok")
    }

    #[tokio::test]
    async fn search_parses_wrapped_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/search"))
            .and(query_param("q", "+5511999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    {"id": 123, "phone_number": "+5511999", "custom_attributes": {}},
                    "not-a-contact"
                ]
            })))
            .mount(&server)
            .await;

        let contacts = crm_for(&server)
            .search_contacts("+5511999")
            .await
            .expect("search");

        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, 123);
    }

    #[tokio::test]
    async fn conversations_parse_status_and_inbox() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/123/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"payload": [
                    {"id": 90, "status": "open", "inbox_id": 4,
                     "last_activity_at": "2024-01-01T00:00:00Z"}
                ]}
            })))
            .mount(&server)
            .await;

        let conversations = crm_for(&server)
            .list_conversations(123)
            .await
            .expect("list");

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].inbox(), Some(4));
        assert_eq!(conversations[0].status.as_deref(), Some("open"));
    }

    #[tokio::test]
    async fn note_post_sends_private_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/1/conversations/99/messages"))
            .and(body_partial_json(json!({"private": true, "message_type": "outgoing"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 777})))
            .expect(1)
            .mount(&server)
            .await;

        crm_for(&server)
            .post_note(99, "[order:confirmed:ORD-9] follow-up sent")
            .await
            .expect("post note");
    }

    #[tokio::test]
    async fn patch_failure_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/v1/accounts/1/contacts/123"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let err = crm_for(&server)
            .patch_contact(123, &Map::new())
            .await
            .expect_err("must fail");

        assert_eq!(err.status(), Some(422));
        assert!(!crate::retry::is_transient(&err));
    }
}
