//! HTTP plumbing for Courier.
//!
//! Provides the transient-error classifier and retry executor, the tolerant
//! response normalizer, and clients for the three external collaborators:
//! the contact source, the messaging gateway, and the CRM.

use std::time::Duration;

use reqwest::Client;

use courier_shared::{CourierError, Result};

pub mod contacts;
pub mod crm;
pub mod messaging;
pub mod normalize;
pub mod retry;

pub use contacts::ContactSource;
pub use crm::CrmClient;
pub use messaging::MessageGateway;
pub use retry::{RetryPolicy, backoff_delay, is_transient, with_retry};

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("Courier/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build the HTTP client shared by all Courier API clients.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| CourierError::api(format!("failed to build HTTP client: {e}")))
}
