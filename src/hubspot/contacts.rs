//! Read path: contacts and the notes associated with a contact.
//!
//! Reads never fail visibly. Transport, status and shape errors are logged
//! and answered from the fixtures; a single unreadable note is dropped from
//! the list rather than failing the whole read.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::client::{fetch_json, object_id, CrmRequest, CrmTransport, HubSpotClient};
use super::fixtures;
use crate::error::IntegrationError;
use crate::types::{iso_timestamp, Contact, Note};

const CONTACT_PROPERTIES: &str =
    "firstname,lastname,email,phone,company,createdate,hs_lastmodifieddate";
const NOTE_PROPERTIES: &str = "hs_note_body,hs_createdate,hs_created_by";
const CONTACT_PAGE_SIZE: u32 = 100;

impl HubSpotClient {
    /// First page of contacts, or the fixture contacts when HubSpot can't answer.
    pub async fn list_contacts(&self) -> Vec<Contact> {
        let Some(transport) = self.transport.as_deref() else {
            log::warn!("HubSpot not configured; serving fixture contacts");
            return fixtures::contacts();
        };

        match fetch_contacts(transport).await {
            Ok(contacts) => contacts,
            Err(e) => {
                log::warn!("HubSpot contact list failed, using fixtures: {}", e);
                fixtures::contacts()
            }
        }
    }

    /// One contact by id; falls back to the matching fixture, if any.
    pub async fn get_contact(&self, id: &str) -> Option<Contact> {
        let Some(transport) = self.transport.as_deref() else {
            log::warn!("HubSpot not configured; serving fixture contact {}", id);
            return fixtures::contact(id);
        };

        match fetch_contact(transport, id).await {
            Ok(contact) => Some(contact),
            Err(e) => {
                log::warn!("HubSpot contact {} failed, using fixtures: {}", id, e);
                fixtures::contact(id)
            }
        }
    }

    /// Notes associated with a contact, in association order.
    ///
    /// Zero associations is a real, empty answer. Only a failed association
    /// lookup falls back to the fixture notes.
    pub async fn list_notes_for_contact(&self, contact_id: &str) -> Vec<Note> {
        let Some(transport) = self.transport.as_deref() else {
            log::warn!("HubSpot not configured; serving fixture notes for {}", contact_id);
            return fixtures::notes_for_contact(contact_id);
        };

        let note_ids = match fetch_note_ids(transport, contact_id).await {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!(
                    "HubSpot note associations for {} failed, using fixtures: {}",
                    contact_id,
                    e
                );
                return fixtures::notes_for_contact(contact_id);
            }
        };

        if note_ids.is_empty() {
            return Vec::new();
        }

        let mut notes = Vec::with_capacity(note_ids.len());
        for note_id in &note_ids {
            match fetch_note(transport, note_id, contact_id).await {
                Ok(note) => notes.push(note),
                Err(e) => {
                    log::warn!("Skipping note {}: {}", note_id, e);
                    continue;
                }
            }
        }
        notes
    }
}

async fn fetch_contacts(transport: &dyn CrmTransport) -> Result<Vec<Contact>, IntegrationError> {
    let path = format!(
        "/crm/v3/objects/contacts?limit={}&properties={}",
        CONTACT_PAGE_SIZE, CONTACT_PROPERTIES
    );
    let data = fetch_json(transport, CrmRequest::get(path)).await?;
    normalize_contact_list(&data, Utc::now())
}

async fn fetch_contact(
    transport: &dyn CrmTransport,
    id: &str,
) -> Result<Contact, IntegrationError> {
    let path = format!(
        "/crm/v3/objects/contacts/{}?properties={}",
        path_segment(id),
        CONTACT_PROPERTIES
    );
    let data = fetch_json(transport, CrmRequest::get(path)).await?;
    normalize_contact(&data, Utc::now())
}

async fn fetch_note_ids(
    transport: &dyn CrmTransport,
    contact_id: &str,
) -> Result<Vec<String>, IntegrationError> {
    let path = format!(
        "/crm/v3/objects/contacts/{}/associations/notes",
        path_segment(contact_id)
    );
    let data = fetch_json(transport, CrmRequest::get(path)).await?;
    association_ids(&data)
}

async fn fetch_note(
    transport: &dyn CrmTransport,
    note_id: &str,
    contact_id: &str,
) -> Result<Note, IntegrationError> {
    let path = format!(
        "/crm/v3/objects/notes/{}?properties={}",
        path_segment(note_id),
        NOTE_PROPERTIES
    );
    let data = fetch_json(transport, CrmRequest::get(path)).await?;
    normalize_note(&data, contact_id, Utc::now())
}

/// Percent-encode `id` as a single URL path segment (`/` and space included).
pub(crate) fn path_segment(id: &str) -> String {
    let mut url = url::Url::parse("http://localhost/").expect("static base URL should parse");
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(id);
    }
    let path = url.path();
    path.strip_prefix('/').unwrap_or(path).to_string()
}

fn properties(value: &Value) -> Result<&serde_json::Map<String, Value>, IntegrationError> {
    value
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| IntegrationError::shape("object without properties"))
}

/// A string property; missing, null or non-scalar values become "".
fn prop_string(props: &serde_json::Map<String, Value>, key: &str) -> String {
    match props.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// A timestamp property; missing or empty values become `now`.
fn prop_timestamp(
    props: &serde_json::Map<String, Value>,
    key: &str,
    now: DateTime<Utc>,
) -> String {
    let raw = prop_string(props, key);
    if raw.is_empty() {
        iso_timestamp(now)
    } else {
        raw
    }
}

pub(crate) fn normalize_contact(
    value: &Value,
    now: DateTime<Utc>,
) -> Result<Contact, IntegrationError> {
    let id = object_id(value).ok_or_else(|| IntegrationError::shape("contact without id"))?;
    let props = properties(value)?;

    Ok(Contact {
        id,
        first_name: prop_string(props, "firstname"),
        last_name: prop_string(props, "lastname"),
        email: prop_string(props, "email"),
        phone: prop_string(props, "phone"),
        company: prop_string(props, "company"),
        created_at: prop_timestamp(props, "createdate", now),
        last_modified: prop_timestamp(props, "hs_lastmodifieddate", now),
    })
}

pub(crate) fn normalize_contact_list(
    value: &Value,
    now: DateTime<Utc>,
) -> Result<Vec<Contact>, IntegrationError> {
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| IntegrationError::shape("contact list without results"))?;
    results.iter().map(|c| normalize_contact(c, now)).collect()
}

pub(crate) fn normalize_note(
    value: &Value,
    contact_id: &str,
    now: DateTime<Utc>,
) -> Result<Note, IntegrationError> {
    let id = object_id(value).ok_or_else(|| IntegrationError::shape("note without id"))?;
    let props = properties(value)?;

    Ok(Note {
        id,
        contact_id: contact_id.to_string(),
        text: prop_string(props, "hs_note_body"),
        created_at: prop_timestamp(props, "hs_createdate", now),
        created_by: prop_string(props, "hs_created_by"),
    })
}

/// Note ids from an association listing, in upstream order.
///
/// A missing `results` is an empty listing; a non-array `results` is a shape error.
fn association_ids(value: &Value) -> Result<Vec<String>, IntegrationError> {
    let results = match value.get("results") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(IntegrationError::shape("association results is not a list")),
    };

    Ok(results
        .iter()
        .filter_map(|item| {
            object_id(item).or_else(|| match item.get("toObjectId") {
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
        })
        .collect())
}
