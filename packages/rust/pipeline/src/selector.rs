//! Conversation selection: pick the single best note target among a
//! contact's existing conversations.

use chrono::DateTime;
use serde_json::Value;

use courier_shared::Conversation;

/// Statuses eligible to receive a follow-up note.
const OPEN_STATUSES: &[&str] = &["open", "pending"];

/// Channel types recognized as messaging channels (exact match).
const MESSAGING_CHANNELS: &[&str] = &["Channel::Whatsapp", "whatsapp"];

/// Selection constraints.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Inbox ids eligible for notes. Empty means "filter by channel type
    /// when the conversation exposes one, else accept".
    pub allowed_inbox_ids: Vec<i64>,
}

/// Pick the most recently active open/pending conversation.
///
/// Ties on equal timestamps keep input order (stable sort), so the first
/// conversation the CRM returned wins.
pub fn select_conversation<'a>(
    conversations: &'a [Conversation],
    options: &SelectOptions,
) -> Option<&'a Conversation> {
    let mut candidates: Vec<&Conversation> = conversations
        .iter()
        .filter(|c| {
            c.status
                .as_deref()
                .is_some_and(|s| OPEN_STATUSES.contains(&s))
        })
        .filter(|c| in_allowed_channel(c, &options.allowed_inbox_ids))
        .collect();

    candidates.sort_by_key(|c| std::cmp::Reverse(activity_epoch(c)));
    candidates.first().copied()
}

fn in_allowed_channel(conversation: &Conversation, allowed: &[i64]) -> bool {
    if !allowed.is_empty() {
        return conversation.inbox().is_some_and(|id| allowed.contains(&id));
    }

    match conversation.channel_type() {
        Some(channel) => MESSAGING_CHANNELS.contains(&channel),
        None => true,
    }
}

/// Epoch ms of the conversation's last activity, falling back to the
/// updated/created timestamps; missing or unparsable values sort as 0.
pub(crate) fn activity_epoch(conversation: &Conversation) -> i64 {
    let raw = [
        &conversation.last_activity_at,
        &conversation.updated_at,
        &conversation.created_at,
    ]
    .into_iter()
    .flatten()
    .find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    });

    to_epoch(raw)
}

/// Numbers pass through as epoch ms; strings parse as RFC 3339.
fn to_epoch(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0),
        _ => 0,
    }
}
