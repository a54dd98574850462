//! Tolerant extraction of list payloads from heterogeneous response envelopes.
//!
//! Upstream endpoints wrap their lists differently depending on version and
//! endpoint. The accepted shapes are an enumerated, reviewable contract
//! (an ordered table of key paths per payload kind) rather than ad hoc
//! property probing. Unrecognized shapes degrade to an empty list, which
//! callers treat as a legitimate empty result, never an error.

use serde_json::Value;

/// Key paths probed for contact search responses, in order.
pub const CONTACT_PATHS: &[&[&str]] = &[
    &["payload"],
    &["data", "payload"],
    &["data", "contacts"],
    &["contacts"],
];

/// Key paths probed for conversation list responses, in order.
pub const CONVERSATION_PATHS: &[&[&str]] = &[
    &["payload"],
    &["data", "payload"],
    &["data", "conversations"],
    &["conversations"],
];

/// Key paths probed for contact-source page responses, in order.
pub const PAGE_ITEM_PATHS: &[&[&str]] = &[
    &["contacts"],
    &["items"],
    &["data", "contacts"],
    &["data", "items"],
];

/// Return the first array found at any of `paths`, or the response itself
/// if it is a bare array, or empty.
pub fn extract_list(response: &Value, paths: &[&[&str]]) -> Vec<Value> {
    for path in paths {
        let mut cursor = response;
        let mut resolved = true;

        for segment in *path {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => {
                    resolved = false;
                    break;
                }
            }
        }

        if resolved {
            if let Value::Array(items) = cursor {
                return items.clone();
            }
        }
    }

    if let Value::Array(items) = response {
        return items.clone();
    }

    Vec::new()
}

/// Extract the contact list from a search response.
pub fn extract_contacts(response: &Value) -> Vec<Value> {
    extract_list(response, CONTACT_PATHS)
}

/// Extract the conversation list from a listing response.
pub fn extract_conversations(response: &Value) -> Vec<Value> {
    extract_list(response, CONVERSATION_PATHS)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn contacts_accept_all_known_envelopes() {
        assert_eq!(extract_contacts(&json!({"payload": [{"id": 1}]})).len(), 1);
        assert_eq!(
            extract_contacts(&json!({"data": {"payload": [{"id": 1}]}})).len(),
            1
        );
        assert_eq!(
            extract_contacts(&json!({"data": {"contacts": [{"id": 1}]}})).len(),
            1
        );
        assert_eq!(extract_contacts(&json!({"contacts": [{"id": 1}]})).len(), 1);
        assert!(extract_contacts(&json!({"foo": "bar"})).is_empty());
    }

    #[test]
    fn conversations_accept_all_known_envelopes() {
        assert_eq!(
            extract_conversations(&json!({"payload": [{"id": 1}]})).len(),
            1
        );
        assert_eq!(
            extract_conversations(&json!({"data": {"conversations": [{"id": 1}]}})).len(),
            1
        );
        assert_eq!(
            extract_conversations(&json!({"conversations": [{"id": 1}]})).len(),
            1
        );
        assert!(extract_conversations(&json!({"foo": "bar"})).is_empty());
    }

    #[test]
    fn bare_array_passes_through() {
        let items = extract_list(&json!([{"id": 1}, {"id": 2}]), CONTACT_PATHS);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn first_matching_path_wins() {
        // `payload` comes before `contacts` in the table.
        let response = json!({"payload": [{"id": 1}], "contacts": [{"id": 2}, {"id": 3}]});
        let items = extract_contacts(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], 1);
    }

    #[test]
    fn non_array_at_path_is_skipped() {
        // `payload` resolves to an object, so the probe falls through.
        let response = json!({"payload": {"id": 1}, "contacts": [{"id": 2}]});
        let items = extract_contacts(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], 2);
    }

    #[test]
    fn scalars_degrade_to_empty() {
        assert!(extract_list(&json!("nope"), CONTACT_PATHS).is_empty());
        assert!(extract_list(&json!(null), CONTACT_PATHS).is_empty());
        assert!(extract_list(&json!(42), CONTACT_PATHS).is_empty());
    }
}
