//! Shared types, error model, and configuration for Courier.
//!
//! This crate is the foundation depended on by all other Courier crates.
//! It provides:
//! - [`CourierError`] — the unified error type
//! - Domain types ([`Contact`], [`Conversation`], [`DeliveryOutcome`], ...)
//! - Configuration ([`AppConfig`], [`JobConfig`], config loading, secrets)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrmConfig, GatewayConfig, JobConfig, JobSection, ObservabilityConfig, SourceConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_secret,
};
pub use error::{CourierError, Result};
pub use types::{
    Contact, ContactPage, Conversation, ConversationMeta, Correlation, CrmContact,
    DeliveryOutcome, ErrorDetail, InboxMeta, NOTE_KEYS_ATTR, ResultRecord, SendReceipt,
    SkipReason, idempotency_key,
};
