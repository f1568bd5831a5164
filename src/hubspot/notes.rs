//! Write path: create a note and link it to its contact.
//!
//! Three association strategies are tried in configured order:
//! 1. Combined: one `POST /crm/v3/objects/notes` carrying the association
//!    (HUBSPOT_DEFINED / type 202, note to contact).
//! 2. Batch: create the bare note, then
//!    `POST /crm/v3/associations/notes/contacts/batch/create`.
//! 3. Direct: `PUT /crm/v3/objects/notes/{note}/associations/contacts/{contact}/note_to_contact`.
//!
//! Each strategy hands the next one whatever note id already exists, so a
//! note is created at most once per call after the combined attempt. The
//! caller always gets a displayable note back: linked, created-but-unlinked
//! (with a warning), or synthesized locally when HubSpot never accepted it.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::client::{fetch_json, object_id, CrmRequest, CrmTransport, HubSpotClient};
use super::contacts::path_segment;
use crate::error::IntegrationError;
use crate::types::{iso_timestamp, Note};

/// HubSpot-defined association type id for note to contact.
const NOTE_TO_CONTACT_TYPE_ID: u32 = 202;
const NOTE_TO_CONTACT_LABEL: &str = "note_to_contact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationStrategy {
    Combined,
    Batch,
    Direct,
}

impl AssociationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationStrategy::Combined => "combined",
            AssociationStrategy::Batch => "batch",
            AssociationStrategy::Direct => "direct",
        }
    }
}

impl fmt::Display for AssociationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(AssociationStrategy::Combined),
            "batch" => Ok(AssociationStrategy::Batch),
            "direct" => Ok(AssociationStrategy::Direct),
            other => Err(format!("unknown association strategy: {}", other)),
        }
    }
}

/// Where the created note ended up relative to its contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LinkStatus {
    /// Created in HubSpot and linked to the contact.
    Linked { strategy: AssociationStrategy },
    /// Created in HubSpot, but every association attempt failed.
    Unlinked { warning: String, details: Vec<String> },
    /// Never reached HubSpot. `warning` is set when HubSpot was configured but refused.
    Local { warning: Option<String> },
}

/// Result of `HubSpotClient::create_note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCreation {
    pub note: Note,
    pub link: LinkStatus,
}

impl NoteCreation {
    /// Message the user must see, if the outcome was degraded.
    pub fn warning(&self) -> Option<&str> {
        match &self.link {
            LinkStatus::Linked { .. } => None,
            LinkStatus::Unlinked { warning, .. } => Some(warning),
            LinkStatus::Local { warning } => warning.as_deref(),
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self.link, LinkStatus::Linked { .. })
    }
}

/// State carried from one strategy to the next.
#[derive(Debug, Default, Clone)]
struct Carried {
    note_id: Option<String>,
    failures: Vec<String>,
}

impl Carried {
    fn failed(mut self, strategy: AssociationStrategy, err: &IntegrationError) -> Self {
        self.failures.push(format!("{}: {}", strategy, err));
        self
    }
}

enum StrategyOutcome {
    /// Note exists and is linked.
    Success(String),
    /// Try the next strategy with this state.
    Retryable(Carried),
    /// The note itself could not be created; no later strategy can help.
    Fatal(String),
}

enum Reconciled {
    Linked {
        note_id: String,
        strategy: AssociationStrategy,
    },
    Unlinked {
        note_id: String,
        failures: Vec<String>,
    },
    NotCreated {
        reason: String,
    },
}

struct NoteDraft<'a> {
    contact_id: &'a str,
    text: &'a str,
    timestamp_millis: i64,
}

impl HubSpotClient {
    /// Create a note for `contact_id`.
    ///
    /// Only `InvalidInput` is returned as an error; every upstream failure
    /// degrades to an unlinked or locally synthesized note.
    pub async fn create_note(
        &self,
        contact_id: &str,
        text: &str,
        created_by: &str,
    ) -> Result<NoteCreation, IntegrationError> {
        validate_note_input(contact_id, text, created_by)?;

        let Some(transport) = self.transport.as_deref() else {
            log::warn!("HubSpot not configured; creating note for {} locally", contact_id);
            return Ok(NoteCreation {
                note: local_note(contact_id, text, created_by),
                link: LinkStatus::Local { warning: None },
            });
        };

        log::info!(
            "Creating note for contact {} by {} ({} chars)",
            contact_id,
            created_by,
            text.chars().count()
        );

        let now = Utc::now();
        let draft = NoteDraft {
            contact_id,
            text,
            timestamp_millis: now.timestamp_millis(),
        };

        let creation = match reconcile(transport, &self.strategies, &draft).await {
            Reconciled::Linked { note_id, strategy } => {
                log::info!("Note {} linked to contact {} ({})", note_id, contact_id, strategy);
                NoteCreation {
                    note: upstream_note(note_id, contact_id, text, created_by),
                    link: LinkStatus::Linked { strategy },
                }
            }
            Reconciled::Unlinked { note_id, failures } => {
                log::warn!(
                    "Note {} created but not linked to contact {}: {}",
                    note_id,
                    contact_id,
                    failures.join("; ")
                );
                NoteCreation {
                    note: upstream_note(note_id, contact_id, text, created_by),
                    link: LinkStatus::Unlinked {
                        warning: "Note was created but could not be linked to the contact"
                            .to_string(),
                        details: failures,
                    },
                }
            }
            Reconciled::NotCreated { reason } => {
                log::error!("Note for contact {} not created in HubSpot: {}", contact_id, reason);
                NoteCreation {
                    note: local_note(contact_id, text, created_by),
                    link: LinkStatus::Local {
                        warning: Some(format!(
                            "Note could not be saved to HubSpot and exists only locally ({})",
                            reason
                        )),
                    },
                }
            }
        };
        Ok(creation)
    }
}

fn validate_note_input(
    contact_id: &str,
    text: &str,
    created_by: &str,
) -> Result<(), IntegrationError> {
    let missing: Vec<&str> = [
        ("contactId", contact_id),
        ("text", text),
        ("createdBy", created_by),
    ]
    .iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| *name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IntegrationError::invalid(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Apply strategies in order until one links the note or all are exhausted.
async fn reconcile(
    transport: &dyn CrmTransport,
    strategies: &[AssociationStrategy],
    draft: &NoteDraft<'_>,
) -> Reconciled {
    let mut carried = Carried::default();

    for &strategy in strategies {
        log::info!("Trying {} association strategy", strategy);
        match run_strategy(strategy, transport, draft, carried).await {
            StrategyOutcome::Success(note_id) => {
                return Reconciled::Linked { note_id, strategy };
            }
            StrategyOutcome::Retryable(next) => carried = next,
            StrategyOutcome::Fatal(reason) => return Reconciled::NotCreated { reason },
        }
    }

    match carried.note_id {
        Some(note_id) => Reconciled::Unlinked {
            note_id,
            failures: carried.failures,
        },
        None => Reconciled::NotCreated {
            reason: carried
                .failures
                .last()
                .cloned()
                .unwrap_or_else(|| "no association strategy enabled".to_string()),
        },
    }
}

async fn run_strategy(
    strategy: AssociationStrategy,
    transport: &dyn CrmTransport,
    draft: &NoteDraft<'_>,
    carried: Carried,
) -> StrategyOutcome {
    match strategy {
        AssociationStrategy::Combined => combined(transport, draft, carried).await,
        AssociationStrategy::Batch => batch(transport, draft, carried).await,
        AssociationStrategy::Direct => direct(transport, draft, carried).await,
    }
}

async fn combined(
    transport: &dyn CrmTransport,
    draft: &NoteDraft<'_>,
    carried: Carried,
) -> StrategyOutcome {
    if carried.note_id.is_some() {
        // Would create a second note.
        log::info!("Skipping combined strategy: note already exists");
        return StrategyOutcome::Retryable(carried);
    }

    let body = json!({
        "properties": {
            "hs_note_body": draft.text,
            "hs_timestamp": draft.timestamp_millis,
        },
        "associations": [{
            "to": { "id": draft.contact_id },
            "types": [{
                "associationCategory": "HUBSPOT_DEFINED",
                "associationTypeId": NOTE_TO_CONTACT_TYPE_ID,
            }],
        }],
    });

    match create_object(transport, body).await {
        Ok(note_id) => StrategyOutcome::Success(note_id),
        Err(e) => {
            log::warn!("Combined note+association request failed: {}", e);
            StrategyOutcome::Retryable(carried.failed(AssociationStrategy::Combined, &e))
        }
    }
}

async fn batch(
    transport: &dyn CrmTransport,
    draft: &NoteDraft<'_>,
    carried: Carried,
) -> StrategyOutcome {
    let (note_id, carried) = match ensure_note(transport, draft, carried).await {
        Ok(pair) => pair,
        Err(reason) => return StrategyOutcome::Fatal(reason),
    };

    let body = json!({
        "inputs": [{
            "from": { "id": note_id },
            "to": { "id": draft.contact_id },
            "type": NOTE_TO_CONTACT_LABEL,
        }],
    });
    let request = CrmRequest::post("/crm/v3/associations/notes/contacts/batch/create", body);

    match fetch_json(transport, request).await {
        Ok(_) => StrategyOutcome::Success(note_id),
        Err(e) => {
            log::warn!("Batch association for note {} failed: {}", note_id, e);
            StrategyOutcome::Retryable(carried.failed(AssociationStrategy::Batch, &e))
        }
    }
}

async fn direct(
    transport: &dyn CrmTransport,
    draft: &NoteDraft<'_>,
    carried: Carried,
) -> StrategyOutcome {
    let (note_id, carried) = match ensure_note(transport, draft, carried).await {
        Ok(pair) => pair,
        Err(reason) => return StrategyOutcome::Fatal(reason),
    };

    let path = format!(
        "/crm/v3/objects/notes/{}/associations/contacts/{}/{}",
        path_segment(&note_id),
        path_segment(draft.contact_id),
        NOTE_TO_CONTACT_LABEL
    );

    match fetch_json(transport, CrmRequest::put(path)).await {
        Ok(_) => StrategyOutcome::Success(note_id),
        Err(e) => {
            log::warn!("Direct association for note {} failed: {}", note_id, e);
            StrategyOutcome::Retryable(carried.failed(AssociationStrategy::Direct, &e))
        }
    }
}

/// Reuse the carried note id, or create a bare note and carry its id forward.
async fn ensure_note(
    transport: &dyn CrmTransport,
    draft: &NoteDraft<'_>,
    mut carried: Carried,
) -> Result<(String, Carried), String> {
    if let Some(note_id) = carried.note_id.clone() {
        return Ok((note_id, carried));
    }

    let body = json!({
        "properties": {
            "hs_note_body": draft.text,
            "hs_timestamp": draft.timestamp_millis,
        },
    });

    match create_object(transport, body).await {
        Ok(note_id) => {
            log::info!("Created bare note {}", note_id);
            carried.note_id = Some(note_id.clone());
            Ok((note_id, carried))
        }
        Err(e) => Err(format!("note creation failed: {}", e)),
    }
}

async fn create_object(
    transport: &dyn CrmTransport,
    body: serde_json::Value,
) -> Result<String, IntegrationError> {
    let data = fetch_json(transport, CrmRequest::post("/crm/v3/objects/notes", body)).await?;
    object_id(&data).ok_or_else(|| IntegrationError::shape("created note has no id"))
}

fn upstream_note(note_id: String, contact_id: &str, text: &str, created_by: &str) -> Note {
    Note {
        id: note_id,
        contact_id: contact_id.to_string(),
        text: text.to_string(),
        created_at: iso_timestamp(Utc::now()),
        created_by: created_by.to_string(),
    }
}

fn local_note(contact_id: &str, text: &str, created_by: &str) -> Note {
    let now = Utc::now();
    Note {
        id: format!("note-{}", now.timestamp_millis()),
        contact_id: contact_id.to_string(),
        text: text.to_string(),
        created_at: iso_timestamp(now),
        created_by: created_by.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use regex::Regex;

    use super::*;
    use crate::hubspot::client::testing::ScriptedTransport;
    use crate::hubspot::client::{CrmMethod, CrmResponse};
    use crate::hubspot::default_association_strategies;

    const NOTES_PATH: &str = "/crm/v3/objects/notes";
    const BATCH_PATH: &str = "/crm/v3/associations/notes/contacts/batch/create";

    fn client(transport: Arc<ScriptedTransport>) -> HubSpotClient {
        HubSpotClient::with_transport(transport, default_association_strategies())
    }

    fn note_posts(transport: &ScriptedTransport) -> usize {
        transport
            .calls()
            .iter()
            .filter(|c| c.method == CrmMethod::Post && c.path == NOTES_PATH)
            .count()
    }

    #[tokio::test]
    async fn mock_mode_synthesizes_local_note() {
        let created = HubSpotClient::mock()
            .create_note("42", "Hello", "Sam")
            .await
            .unwrap();

        let pattern = Regex::new(r"^note-\d+$").unwrap();
        assert!(pattern.is_match(&created.note.id), "id {}", created.note.id);
        assert_eq!(created.note.contact_id, "42");
        assert_eq!(created.note.text, "Hello");
        assert_eq!(created.note.created_by, "Sam");
        assert_eq!(created.link, LinkStatus::Local { warning: None });
        assert!(created.warning().is_none());
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_input() {
        let hubspot = HubSpotClient::mock();
        match hubspot.create_note("", "Hello", " ").await {
            Err(IntegrationError::InvalidInput(msg)) => {
                assert!(msg.contains("contactId"));
                assert!(msg.contains("createdBy"));
                assert!(!msg.contains("text"));
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn combined_success_stops_the_chain() {
        let transport = Arc::new(ScriptedTransport::new().respond(
            CrmMethod::Post,
            NOTES_PATH,
            201,
            r#"{"id":"9001"}"#,
        ));
        let created = client(transport.clone())
            .create_note("42", "Hello", "Sam")
            .await
            .unwrap();

        assert_eq!(created.note.id, "9001");
        assert_eq!(
            created.link,
            LinkStatus::Linked {
                strategy: AssociationStrategy::Combined
            }
        );

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["properties"]["hs_note_body"], "Hello");
        assert_eq!(body["associations"][0]["to"]["id"], "42");
        assert_eq!(
            body["associations"][0]["types"][0]["associationCategory"],
            "HUBSPOT_DEFINED"
        );
        assert_eq!(body["associations"][0]["types"][0]["associationTypeId"], 202);
    }

    /// Combined fails, then the bare create answers and batch links it.
    struct CombinedRejected {
        inner: ScriptedTransport,
    }

    #[async_trait::async_trait]
    impl CrmTransport for CombinedRejected {
        async fn send(&self, request: CrmRequest) -> Result<CrmResponse, IntegrationError> {
            let is_combined = request
                .body
                .as_ref()
                .map(|b| b.get("associations").is_some())
                .unwrap_or(false);
            if request.path == NOTES_PATH && is_combined {
                self.inner.calls.lock().unwrap().push(request);
                return Ok(CrmResponse {
                    status: 400,
                    body: "associations not supported".into(),
                });
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test]
    async fn batch_links_after_combined_fails() {
        let transport = Arc::new(CombinedRejected {
            inner: ScriptedTransport::new()
                .respond(CrmMethod::Post, NOTES_PATH, 201, r#"{"id":"77"}"#)
                .respond(CrmMethod::Post, BATCH_PATH, 201, r#"{"status":"COMPLETE"}"#),
        });
        let hubspot =
            HubSpotClient::with_transport(transport.clone(), default_association_strategies());
        let created = hubspot.create_note("42", "Hello", "Sam").await.unwrap();

        assert_eq!(created.note.id, "77");
        assert_eq!(
            created.link,
            LinkStatus::Linked {
                strategy: AssociationStrategy::Batch
            }
        );
        let calls = transport.inner.calls();
        assert_eq!(calls.len(), 3);
        let batch = calls[2].body.as_ref().unwrap();
        assert_eq!(batch["inputs"][0]["from"]["id"], "77");
        assert_eq!(batch["inputs"][0]["to"]["id"], "42");
        assert_eq!(batch["inputs"][0]["type"], "note_to_contact");
    }

    #[tokio::test]
    async fn direct_reuses_the_note_created_for_batch() {
        let transport = Arc::new(CombinedRejected {
            inner: ScriptedTransport::new()
                .respond(CrmMethod::Post, NOTES_PATH, 201, r#"{"id":"77"}"#)
                .respond(CrmMethod::Post, BATCH_PATH, 500, "batch unavailable")
                .respond(
                    CrmMethod::Put,
                    "/crm/v3/objects/notes/77/associations/contacts/42",
                    200,
                    "{}",
                ),
        });
        let hubspot =
            HubSpotClient::with_transport(transport.clone(), default_association_strategies());
        let created = hubspot.create_note("42", "Hello", "Sam").await.unwrap();

        assert_eq!(created.note.id, "77");
        assert_eq!(
            created.link,
            LinkStatus::Linked {
                strategy: AssociationStrategy::Direct
            }
        );

        let calls = transport.inner.calls();
        let bare_creates = calls
            .iter()
            .filter(|c| {
                c.path == NOTES_PATH
                    && c.body.as_ref().map(|b| b.get("associations").is_none()) == Some(true)
            })
            .count();
        assert_eq!(bare_creates, 1);
        let last = calls.last().unwrap();
        assert_eq!(last.method, CrmMethod::Put);
        assert_eq!(
            last.path,
            "/crm/v3/objects/notes/77/associations/contacts/42/note_to_contact"
        );
    }

    #[tokio::test]
    async fn all_associations_failing_keeps_the_real_note_id() {
        let transport = Arc::new(CombinedRejected {
            inner: ScriptedTransport::new()
                .respond(CrmMethod::Post, NOTES_PATH, 201, r#"{"id":"77"}"#)
                .respond(CrmMethod::Post, BATCH_PATH, 500, "batch unavailable")
                .fail(CrmMethod::Put, "/crm/v3/objects/notes/77", "connection reset"),
        });
        let hubspot =
            HubSpotClient::with_transport(transport.clone(), default_association_strategies());
        let created = hubspot.create_note("42", "Hello", "Sam").await.unwrap();

        assert_eq!(created.note.id, "77");
        assert!(!created.is_linked());
        assert_eq!(
            created.warning(),
            Some("Note was created but could not be linked to the contact")
        );
        match &created.link {
            LinkStatus::Unlinked { details, .. } => {
                assert_eq!(details.len(), 3);
                assert!(details[0].starts_with("combined"));
                assert!(details[1].starts_with("batch"));
                assert!(details[2].starts_with("direct"));
            }
            other => panic!("expected Unlinked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparsable_combined_answer_falls_through() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(CrmMethod::Post, NOTES_PATH, 200, "not json")
                .respond(CrmMethod::Post, BATCH_PATH, 201, "{}"),
        );
        let created = client(transport.clone())
            .create_note("42", "Hello", "Sam")
            .await
            .unwrap();

        // Both note creations hit the same unparsable answer, so no id exists.
        assert!(created.note.id.starts_with("note-"));
        assert!(created.warning().unwrap().contains("only locally"));
        assert_eq!(note_posts(&transport), 2);
        assert!(transport.calls().iter().all(|c| c.path != BATCH_PATH));
    }

    #[tokio::test]
    async fn note_creation_failure_synthesizes_local_note() {
        let transport = Arc::new(ScriptedTransport::new().fail(
            CrmMethod::Post,
            NOTES_PATH,
            "connection refused",
        ));
        let created = client(transport.clone())
            .create_note("42", "Hello", "Sam")
            .await
            .unwrap();

        assert!(Regex::new(r"^note-\d+$").unwrap().is_match(&created.note.id));
        assert_eq!(created.note.text, "Hello");
        match &created.link {
            LinkStatus::Local { warning: Some(w) } => assert!(w.contains("connection refused")),
            other => panic!("expected Local with warning, got {:?}", other),
        }
        // combined, then batch's bare create; direct never runs
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn configured_order_is_respected() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(CrmMethod::Post, NOTES_PATH, 201, r#"{"id":"5"}"#)
                .respond(CrmMethod::Put, "/crm/v3/objects/notes/5/", 200, ""),
        );
        let hubspot = HubSpotClient::with_transport(
            transport.clone(),
            vec![AssociationStrategy::Direct, AssociationStrategy::Combined],
        );
        let created = hubspot.create_note("8", "Hi", "Bo").await.unwrap();

        assert_eq!(
            created.link,
            LinkStatus::Linked {
                strategy: AssociationStrategy::Direct
            }
        );
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].body.as_ref().unwrap().get("associations").is_none());
    }

    #[test]
    fn strategy_names_round_trip_through_from_str() {
        assert_eq!("Batch".parse::<AssociationStrategy>(), Ok(AssociationStrategy::Batch));
        assert_eq!(" direct ".parse::<AssociationStrategy>(), Ok(AssociationStrategy::Direct));
        assert!("v1".parse::<AssociationStrategy>().is_err());
        assert_eq!(AssociationStrategy::Combined.to_string(), "combined");
    }

    #[test]
    fn link_status_serializes_with_tag() {
        let value = serde_json::to_value(LinkStatus::Linked {
            strategy: AssociationStrategy::Batch,
        })
        .unwrap();
        assert_eq!(value["status"], "linked");
        assert_eq!(value["strategy"], "batch");
    }
}
