//! Core domain types for the Courier follow-up pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Custom-attribute key holding a contact's persisted idempotency keys.
pub const NOTE_KEYS_ATTR: &str = "followup_note_keys";

/// Build the idempotency key for one confirmed order.
pub fn idempotency_key(order_id: &str) -> String {
    format!("order:confirmed:{order_id}")
}

// ---------------------------------------------------------------------------
// Contact (work item)
// ---------------------------------------------------------------------------

/// One follow-up work item, as paged from the contact source.
///
/// Owned by the upstream system of record; Courier holds a transient,
/// run-scoped copy. Upstream serializers disagree on id types (string vs
/// number), so the id is normalized to a string during deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    /// Work-item identifier, unique within a run.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,

    /// Destination phone number.
    #[serde(default)]
    pub phone: Option<String>,

    /// Already-prepared outbound message.
    #[serde(default, rename = "followupMessage", alias = "followup_message")]
    pub followup_message: Option<String>,

    /// Set once a follow-up has been scheduled for this contact.
    #[serde(default, rename = "alreadyScheduled", alias = "already_scheduled")]
    pub already_scheduled: bool,
}

/// One fetched page of contacts plus the cursor for the next page.
///
/// `next_cursor == None` signals end of stream. Transient, never persisted.
#[derive(Debug, Clone, Default)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    pub next_cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// CRM-owned records
// ---------------------------------------------------------------------------

/// A contact record as the CRM returns it from search.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmContact {
    pub id: i64,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    /// Opaque attribute bag; [`NOTE_KEYS_ATTR`] carries the idempotency keys.
    #[serde(default)]
    pub custom_attributes: serde_json::Map<String, Value>,
}

impl CrmContact {
    /// The idempotency keys previously persisted on this contact.
    pub fn note_keys(&self) -> Vec<String> {
        match self.custom_attributes.get(NOTE_KEYS_ATTR) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A CRM conversation. Never created by Courier, only selected among
/// existing ones.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub inbox_id: Option<i64>,
    #[serde(default)]
    pub meta: Option<ConversationMeta>,
    /// Activity timestamps arrive as epoch numbers or RFC 3339 strings
    /// depending on the CRM endpoint; kept raw for the selector to parse.
    #[serde(default)]
    pub last_activity_at: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
}

/// Nested conversation metadata (channel/inbox identity).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub inbox: Option<InboxMeta>,
}

/// Inbox identity nested under conversation metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxMeta {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

impl Conversation {
    /// Inbox id, preferring the top-level field over nested metadata.
    pub fn inbox(&self) -> Option<i64> {
        self.inbox_id
            .or_else(|| self.meta.as_ref().and_then(|m| m.inbox.as_ref()).and_then(|i| i.id))
    }

    /// Channel type string, preferring `meta.channel` over the inbox's.
    pub fn channel_type(&self) -> Option<&str> {
        let meta = self.meta.as_ref()?;
        meta.channel
            .as_deref()
            .or_else(|| meta.inbox.as_ref().and_then(|i| i.channel_type.as_deref()))
    }
}

/// Delivery receipt from the messaging gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub sent_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Entity identifiers accumulated as the pipeline resolves each step.
/// Attached to every log line and outcome, even on partial failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub order_id: Option<String>,
    pub contact_id: Option<i64>,
    pub conversation_id: Option<i64>,
}

/// Why an item was skipped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ContactIdMissing,
    AlreadyScheduled,
    MissingRequiredData,
    ContactNotFound,
    ConversationNotFound,
    DuplicateEvent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactIdMissing => "contact_id_missing",
            Self::AlreadyScheduled => "already_scheduled",
            Self::MissingRequiredData => "missing_required_data",
            Self::ContactNotFound => "contact_not_found",
            Self::ConversationNotFound => "conversation_not_found",
            Self::DuplicateEvent => "duplicate_event",
        }
    }
}

/// Detail attached to an `error` outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Terminal outcome of processing one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent {
        message_id: String,
        idempotency_key: String,
        correlation: Correlation,
    },
    Skipped {
        reason: SkipReason,
        correlation: Correlation,
    },
    Error {
        #[serde(rename = "error")]
        detail: ErrorDetail,
        correlation: Correlation,
    },
}

impl DeliveryOutcome {
    /// Short status label for logs and summaries.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Skipped { .. } => "skipped",
            Self::Error { .. } => "error",
        }
    }
}

/// One line of the observability log. Immutable once written; the sink
/// appends a generated timestamp at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub contact_id: Option<String>,
    pub phone: Option<String>,
    /// 1-indexed page number, for log attribution only.
    pub page: u32,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Accept a string or numeric id, normalizing to a non-empty string.
fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_format() {
        assert_eq!(idempotency_key("ORD-9"), "order:confirmed:ORD-9");
    }

    #[test]
    fn contact_accepts_string_or_numeric_id() {
        let from_str: Contact =
            serde_json::from_value(serde_json::json!({"id": "c-1", "phone": "+5511999"}))
                .expect("string id");
        assert_eq!(from_str.id.as_deref(), Some("c-1"));

        let from_num: Contact =
            serde_json::from_value(serde_json::json!({"id": 42, "followupMessage": "oi"}))
                .expect("numeric id");
        assert_eq!(from_num.id.as_deref(), Some("42"));
        assert_eq!(from_num.followup_message.as_deref(), Some("oi"));
        assert!(!from_num.already_scheduled);
    }

    #[test]
    fn crm_contact_note_keys() {
        let contact: CrmContact = serde_json::from_value(serde_json::json!({
            "id": 123,
            "phone_number": "+5511999",
            "custom_attributes": { NOTE_KEYS_ATTR: ["order:confirmed:abc", 7] }
        }))
        .expect("parse");

        // Non-string entries are ignored rather than failing the parse.
        assert_eq!(contact.note_keys(), vec!["order:confirmed:abc"]);

        let bare: CrmContact = serde_json::from_value(serde_json::json!({"id": 1})).expect("parse");
        assert!(bare.note_keys().is_empty());
    }

    #[test]
    fn conversation_inbox_and_channel_fallbacks() {
        let conv: Conversation = serde_json::from_value(serde_json::json!({
            "id": 9,
            "status": "open",
            "meta": { "inbox": { "id": 4, "channel_type": "Channel::Whatsapp" } }
        }))
        .expect("parse");

        assert_eq!(conv.inbox(), Some(4));
        assert_eq!(conv.channel_type(), Some("Channel::Whatsapp"));

        let top_level: Conversation = serde_json::from_value(serde_json::json!({
            "id": 10,
            "inbox_id": 2,
            "meta": { "channel": "whatsapp" }
        }))
        .expect("parse");

        assert_eq!(top_level.inbox(), Some(2));
        assert_eq!(top_level.channel_type(), Some("whatsapp"));
    }

    #[test]
    fn outcome_serialization_shapes() {
        let sent = DeliveryOutcome::Sent {
            message_id: "wamid-1".into(),
            idempotency_key: idempotency_key("ORD-9"),
            correlation: Correlation {
                order_id: Some("ORD-9".into()),
                contact_id: Some(123),
                conversation_id: Some(99),
            },
        };
        let json = serde_json::to_value(&sent).expect("serialize");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["idempotency_key"], "order:confirmed:ORD-9");
        assert_eq!(json["correlation"]["conversation_id"], 99);

        let skipped = DeliveryOutcome::Skipped {
            reason: SkipReason::DuplicateEvent,
            correlation: Correlation::default(),
        };
        let json = serde_json::to_value(&skipped).expect("serialize");
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "duplicate_event");
        // Correlation fields are always present, null when unresolved.
        assert!(json["correlation"]["contact_id"].is_null());

        let error = DeliveryOutcome::Error {
            detail: ErrorDetail {
                message: "[gateway-send] HTTP 500".into(),
                status: Some(500),
                code: None,
            },
            correlation: Correlation::default(),
        };
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["status"], 500);
    }

    #[test]
    fn result_record_flattens_outcome() {
        let record = ResultRecord {
            contact_id: Some("c-1".into()),
            phone: Some("+5511999".into()),
            page: 3,
            outcome: DeliveryOutcome::Skipped {
                reason: SkipReason::AlreadyScheduled,
                correlation: Correlation::default(),
            },
        };

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["page"], 3);
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "already_scheduled");

        let parsed: ResultRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.outcome.status_label(), "skipped");
    }
}
