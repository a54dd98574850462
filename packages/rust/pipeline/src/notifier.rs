//! The idempotent notifier: one contact's follow-up as a single logical
//! unit of work.
//!
//! Steps run strictly in sequence: validate, resolve contact, idempotency
//! check, resolve conversation, send, sync note, persist key. The
//! idempotency check runs before any outbound send, and the key write-back
//! runs only after the gateway confirms the send. That ordering is what
//! makes the pipeline at-most-once across restarts and duplicate triggers.

use std::future::Future;

use serde_json::Value;
use tracing::{info, instrument, warn};

use courier_gateway::{CrmClient, MessageGateway, RetryPolicy, with_retry};
use courier_shared::{
    Contact, Correlation, CrmContact, DeliveryOutcome, NOTE_KEYS_ATTR, Result, SkipReason,
    idempotency_key,
};

use crate::selector::{SelectOptions, select_conversation};

/// Drives one contact through the follow-up state machine.
pub struct Notifier {
    crm: CrmClient,
    gateway: MessageGateway,
    retry: RetryPolicy,
    select: SelectOptions,
}

impl Notifier {
    pub fn new(
        crm: CrmClient,
        gateway: MessageGateway,
        retry: RetryPolicy,
        allowed_inbox_ids: Vec<i64>,
    ) -> Self {
        Self {
            crm,
            gateway,
            retry,
            select: SelectOptions { allowed_inbox_ids },
        }
    }

    /// Process one contact to a terminal outcome.
    ///
    /// Validation and not-found conditions return `Skipped`; unexpected
    /// errors propagate for the orchestrator to convert into an error
    /// outcome (fail closed, never a silent skip).
    #[instrument(skip_all, fields(contact_id = contact.id.as_deref()))]
    pub async fn process(&self, contact: &Contact) -> Result<DeliveryOutcome> {
        let mut correlation = Correlation {
            order_id: contact.id.clone(),
            ..Correlation::default()
        };

        // Step 1: validate. No network calls before this passes.
        let Some(order_id) = contact.id.as_deref() else {
            return Ok(self.skip("validate", SkipReason::ContactIdMissing, correlation));
        };
        if contact.already_scheduled {
            return Ok(self.skip("validate", SkipReason::AlreadyScheduled, correlation));
        }
        let (Some(phone), Some(message)) = (
            contact.phone.as_deref().filter(|s| !s.is_empty()),
            contact.followup_message.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Ok(self.skip("validate", SkipReason::MissingRequiredData, correlation));
        };

        let key = idempotency_key(order_id);

        // Step 2: resolve the CRM contact by phone.
        let candidates = self
            .step("search", "crm-search", &correlation, || {
                self.crm.search_contacts(phone)
            })
            .await?;
        let Some(crm_contact) = pick_contact(candidates, phone) else {
            return Ok(self.skip("search", SkipReason::ContactNotFound, correlation));
        };
        correlation.contact_id = Some(crm_contact.id);
        info!(step = "search", status = "ok", ?correlation, "contact resolved");

        // Step 3: idempotency check, before any outbound call.
        let existing_keys = crm_contact.note_keys();
        if existing_keys.iter().any(|k| k == &key) {
            info!(
                step = "idempotency",
                status = "duplicate",
                idempotency_key = %key,
                ?correlation,
                "event already delivered"
            );
            return Ok(DeliveryOutcome::Skipped {
                reason: SkipReason::DuplicateEvent,
                correlation,
            });
        }

        // Step 4: resolve the target conversation.
        let conversations = self
            .step("list_conversations", "crm-conversations", &correlation, || {
                self.crm.list_conversations(crm_contact.id)
            })
            .await?;
        let Some(conversation) = select_conversation(&conversations, &self.select) else {
            return Ok(self.skip(
                "list_conversations",
                SkipReason::ConversationNotFound,
                correlation,
            ));
        };
        correlation.conversation_id = Some(conversation.id);
        info!(
            step = "list_conversations",
            status = "ok",
            count = conversations.len(),
            ?correlation,
            "conversation selected"
        );

        // Step 5: send. The gateway is the source of truth on success, so a
        // failure here propagates as an error rather than a skip.
        let receipt = self
            .step("send", "gateway-send", &correlation, || {
                self.gateway.send(order_id, phone, message)
            })
            .await?;
        let message_id = receipt.message_id.unwrap_or_default();
        info!(step = "send", status = "ok", message_id = %message_id, ?correlation, "message sent");

        // Step 6: sync a private note into the conversation.
        let note = format!("[{key}] Follow-up sent for order #{order_id}");
        self.step("post_note", "crm-note", &correlation, || {
            self.crm.post_note(conversation.id, &note)
        })
        .await?;
        info!(step = "post_note", status = "ok", ?correlation, "note synced");

        // Step 7: persist the idempotency key, only after the confirmed send.
        let mut attributes = crm_contact.custom_attributes.clone();
        let mut keys = existing_keys;
        keys.push(key.clone());
        attributes.insert(NOTE_KEYS_ATTR.into(), Value::from(keys));
        self.step("patch_contact", "crm-patch", &correlation, || {
            self.crm.patch_contact(crm_contact.id, &attributes)
        })
        .await?;
        info!(
            step = "patch_contact",
            status = "ok",
            idempotency_key = %key,
            ?correlation,
            "idempotency key persisted"
        );

        Ok(DeliveryOutcome::Sent {
            message_id,
            idempotency_key: key,
            correlation,
        })
    }

    fn skip(
        &self,
        step: &'static str,
        reason: SkipReason,
        correlation: Correlation,
    ) -> DeliveryOutcome {
        info!(
            step,
            status = "skipped",
            reason = reason.as_str(),
            ?correlation,
            "contact skipped"
        );
        DeliveryOutcome::Skipped {
            reason,
            correlation,
        }
    }

    /// Run one retried step, logging the step name and correlation on
    /// terminal failure so a failed run can be reconstructed from the logs.
    async fn step<T, F, Fut>(
        &self,
        name: &'static str,
        action: &str,
        correlation: &Correlation,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match with_retry(action, &self.retry, op).await {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(step = name, status = "failed", error = %error, ?correlation, "step failed");
                Err(error)
            }
        }
    }
}

/// Prefer an exact phone/identifier match, else the first search result.
fn pick_contact(candidates: Vec<CrmContact>, phone: &str) -> Option<CrmContact> {
    let exact = candidates.iter().position(|c| {
        c.phone_number.as_deref() == Some(phone) || c.identifier.as_deref() == Some(phone)
    });

    match exact {
        Some(index) => candidates.into_iter().nth(index),
        None => candidates.into_iter().next(),
    }
}
