use serde::{Deserialize, Serialize};

use crate::chat::ChatConfig;
use crate::hubspot::HubSpotConfig;

/// Application configuration.
///
/// Read from `~/.hubnotes/config.json` when present, then overridden from the
/// environment (see `state::load_config`). Every field has a default so an
/// empty object, or no file at all, is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub hubspot: HubSpotConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            hubspot: HubSpotConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

/// A CRM contact, normalized so every field is a concrete string.
///
/// `phone` and `company` are optional upstream; absence is an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub created_at: String,
    pub last_modified: String,
}

/// A note attached to a contact.
///
/// `id` is HubSpot-assigned, or `note-<epoch millis>` when synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub contact_id: String,
    pub text: String,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// ISO-8601 timestamp in the `2023-01-15T10:30:00.000Z` form.
pub fn iso_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
