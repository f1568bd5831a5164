//! HubSpot CRM integration.
//!
//! Reads contacts and notes through the CRM v3 object endpoints and writes
//! notes through the reconciler in `notes`. When no access token is
//! configured every operation answers from the fixtures without network I/O.

pub mod client;
pub mod contacts;
pub mod diagnose;
pub mod fixtures;
pub mod notes;

use serde::{Deserialize, Serialize};

pub use client::{CrmMethod, CrmRequest, CrmResponse, CrmTransport, HubSpotClient, HubSpotHttp};
pub use notes::{AssociationStrategy, LinkStatus, NoteCreation};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.hubapi.com";

/// HubSpot integration configuration (`hubspot` key of the config file).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotConfig {
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Association strategies tried by the note reconciler, in order.
    #[serde(default = "default_association_strategies")]
    pub association_strategies: Vec<AssociationStrategy>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

pub(crate) fn default_association_strategies() -> Vec<AssociationStrategy> {
    vec![
        AssociationStrategy::Combined,
        AssociationStrategy::Batch,
        AssociationStrategy::Direct,
    ]
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            access_token: None,
            association_strategies: default_association_strategies(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HubSpotConfig {
    /// The configured token, if it is non-blank. Absence means mock mode.
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Strategies in configured order with duplicates dropped; never empty.
    pub fn strategies(&self) -> Vec<AssociationStrategy> {
        let mut out: Vec<AssociationStrategy> = Vec::new();
        for strategy in &self.association_strategies {
            if !out.contains(strategy) {
                out.push(*strategy);
            }
        }
        if out.is_empty() {
            default_association_strategies()
        } else {
            out
        }
    }
}
