//! Client for the internal contact source.

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use courier_shared::{Contact, ContactPage, CourierError, Result};

use crate::normalize;

/// Paging endpoint on the contact source.
const FOLLOWUP_PATH: &str = "/internal/contacts/followup";

/// Pages follow-up contacts out of the internal contact source.
pub struct ContactSource {
    client: Client,
    base_url: Url,
}

impl ContactSource {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Fetch one page of follow-up contacts.
    ///
    /// The cursor, not the page number, drives pagination; the backing
    /// collection may mutate between pages.
    pub async fn fetch_page(&self, cursor: Option<&str>, limit: u32) -> Result<ContactPage> {
        let url = self
            .base_url
            .join(FOLLOWUP_PATH)
            .map_err(|e| CourierError::config(format!("bad contact source URL: {e}")))?;

        let response = self
            .client
            .post(url)
            .json(&json!({ "cursor": cursor, "limit": limit }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::api_status(
                status.as_u16(),
                format!("contact source returned HTTP {status}"),
            ));
        }

        let body: Value = response.json().await?;

        // A malformed entry still becomes a work item (with no id) so the
        // notifier records a skip for it instead of dropping it silently.
        let contacts: Vec<Contact> = normalize::extract_list(&body, normalize::PAGE_ITEM_PATHS)
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).unwrap_or_else(|e| {
                    warn!(error = %e, "malformed contact in page");
                    Contact::default()
                })
            })
            .collect();

        let next_cursor = body
            .get("nextCursor")
            .or_else(|| body.get("next_cursor"))
            .and_then(Value::as_str)
            .map(String::from);

        debug!(
            count = contacts.len(),
            next_cursor = next_cursor.as_deref(),
            "contact page fetched"
        );

        Ok(ContactPage {
            contacts,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn source_for(server: &MockServer) -> ContactSource {
        let base = Url::parse(&server.uri()).expect("server uri");
        ContactSource::new(crate::build_client().expect("client"), base)
    }

    #[tokio::test]
    async fn fetches_page_with_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(FOLLOWUP_PATH))
            .and(body_partial_json(json!({"cursor": null, "limit": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contacts": [
                    {"id": "c-1", "phone": "+5511991", "followupMessage": "oi"},
                    {"id": 7, "phone": "+5511992", "followupMessage": "oi"}
                ],
                "nextCursor": "abc"
            })))
            .mount(&server)
            .await;

        let page = source_for(&server)
            .fetch_page(None, 2)
            .await
            .expect("fetch page");

        assert_eq!(page.contacts.len(), 2);
        assert_eq!(page.contacts[1].id.as_deref(), Some("7"));
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn items_envelope_and_absent_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(FOLLOWUP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "c-9"}]
            })))
            .mount(&server)
            .await;

        let page = source_for(&server)
            .fetch_page(Some("abc"), 50)
            .await
            .expect("fetch page");

        assert_eq!(page.contacts.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn non_2xx_carries_status_for_classifier() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(FOLLOWUP_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch_page(None, 10)
            .await
            .expect_err("must fail");

        assert_eq!(err.status(), Some(503));
        assert!(crate::retry::is_transient(&err));
    }
}
