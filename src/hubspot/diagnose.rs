//! Connection diagnostics for the HubSpot integration.
//!
//! Probes the API with the configured token and reports raw statuses. The
//! write probe creates a real (unlinked) note, so it only runs on request.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use super::client::{object_id, CrmRequest, CrmResponse, CrmTransport, HubSpotClient};
use crate::types::iso_timestamp;

const DIAGNOSTIC_NOTE_BODY: &str =
    "Diagnostic note from the HubSpot connection test. Please ignore.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub timestamp: String,
    pub mock_mode: bool,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_preview: Option<String>,
    pub contacts_probe: ProbeResult,
    pub note_probe: ProbeResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ProbeResult {
    Skipped {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Answered {
        status: u16,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl HubSpotClient {
    pub async fn diagnose(&self, probe_write: bool) -> DiagnosticsReport {
        let mut report = DiagnosticsReport {
            timestamp: iso_timestamp(Utc::now()),
            mock_mode: self.is_mock(),
            endpoint: self.endpoint.clone(),
            token_preview: self.token_preview.clone(),
            contacts_probe: skipped("HubSpot access token is not configured"),
            note_probe: skipped("HubSpot access token is not configured"),
        };

        let Some(transport) = self.transport.as_deref() else {
            return report;
        };

        report.contacts_probe = probe_contacts(transport).await;
        report.note_probe = if probe_write {
            probe_note_creation(transport).await
        } else {
            skipped("write probe not requested")
        };

        log::info!(
            "HubSpot diagnostics: contacts={:?} note={:?}",
            report.contacts_probe,
            report.note_probe
        );
        report
    }
}

fn skipped(reason: &str) -> ProbeResult {
    ProbeResult::Skipped {
        reason: reason.to_string(),
    }
}

async fn probe_contacts(transport: &dyn CrmTransport) -> ProbeResult {
    let request = CrmRequest::get("/crm/v3/objects/contacts?limit=1");
    probe(transport, request, |data| {
        json!({
            "total": data.get("total").cloned().unwrap_or(Value::Null),
            "resultsCount": data
                .get("results")
                .and_then(Value::as_array)
                .map(|r| r.len())
                .unwrap_or(0),
        })
    })
    .await
}

async fn probe_note_creation(transport: &dyn CrmTransport) -> ProbeResult {
    let body = json!({ "properties": { "hs_note_body": DIAGNOSTIC_NOTE_BODY } });
    let request = CrmRequest::post("/crm/v3/objects/notes", body);
    probe(transport, request, |data| {
        json!({
            "id": object_id(data),
            "properties": data.get("properties").cloned().unwrap_or(Value::Null),
        })
    })
    .await
}

async fn probe(
    transport: &dyn CrmTransport,
    request: CrmRequest,
    summarize: impl Fn(&Value) -> Value,
) -> ProbeResult {
    match transport.send(request).await {
        Ok(resp) => answered(resp, summarize),
        Err(e) => ProbeResult::Failed {
            error: e.to_string(),
        },
    }
}

fn answered(resp: CrmResponse, summarize: impl Fn(&Value) -> Value) -> ProbeResult {
    let status = resp.status;
    let ok = resp.is_success();
    if !ok {
        return ProbeResult::Answered {
            status,
            ok,
            data: None,
            error: Some(resp.body),
        };
    }
    match resp.into_json() {
        Ok(value) => ProbeResult::Answered {
            status,
            ok,
            data: Some(summarize(&value)),
            error: None,
        },
        Err(e) => ProbeResult::Answered {
            status,
            ok,
            data: None,
            error: Some(e.to_string()),
        },
    }
}
