//! JSON HTTP API consumed by the browser UI.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chat::build_notes_context;
use crate::chat::client::parse_history;
use crate::error::ApiError;
use crate::hubspot::diagnose::DiagnosticsReport;
use crate::state::AppState;
use crate::types::{ChatMessage, Contact, Note};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/contacts", get(list_contacts))
        .route("/api/contacts/:id", get(get_contact))
        .route("/api/contacts/:id/notes", get(list_notes))
        .route("/api/contacts/:id/chat", post(contact_chat))
        .route("/api/notes", post(create_note))
        .route("/api/chat", post(chat))
        .route("/api/hubspot-test", get(hubspot_test))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    if req.uri().path().starts_with("/api/") {
        log::info!("API request: {} {}", req.method(), req.uri().path());
    }
    next.run(req).await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "mockMode": state.hubspot.is_mock() }))
}

async fn list_contacts(State(state): State<Arc<AppState>>) -> Json<Vec<Contact>> {
    Json(state.hubspot.list_contacts().await)
}

async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Contact>, ApiError> {
    state
        .hubspot
        .get_contact(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Contact {} not found", id)))
}

async fn list_notes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<Note>> {
    Json(state.hubspot.list_notes_for_contact(&id).await)
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    let contact_id = string_field(&body, "contactId");
    let text = string_field(&body, "text");
    let created_by = string_field(&body, "createdBy");

    let creation = state
        .hubspot
        .create_note(&contact_id, &text, &created_by)
        .await
        .map_err(|e| ApiError::from_integration("Failed to create note", e))?;

    let mut response = json!({
        "success": true,
        "note": creation.note,
        "linked": creation.is_linked(),
    });
    if let Some(warning) = creation.warning() {
        response["warning"] = json!(warning);
    }
    Ok(Json(response))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    let history = parse_messages(&body)?;
    let notes_context = string_field(&body, "notesContext");
    answer(&state, &history, &notes_context).await
}

async fn contact_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    // Validate before any CRM call.
    let history = parse_messages(&body)?;
    let notes = state.hubspot.list_notes_for_contact(&id).await;
    answer(&state, &history, &build_notes_context(&notes)).await
}

fn parse_messages(body: &Value) -> Result<Vec<ChatMessage>, ApiError> {
    parse_history(body.get("messages").unwrap_or(&Value::Null))
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn answer(
    state: &AppState,
    history: &[ChatMessage],
    notes_context: &str,
) -> Result<Json<Value>, ApiError> {
    let message = state
        .chat
        .ask(history, notes_context)
        .await
        .map_err(|e| ApiError::from_integration("Failed to get chat response", e))?;
    Ok(Json(json!({ "message": message })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnoseParams {
    #[serde(default)]
    probe_write: bool,
}

async fn hubspot_test(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiagnoseParams>,
) -> Json<DiagnosticsReport> {
    Json(state.hubspot.diagnose(params.probe_write).await)
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(format!("invalid JSON body: {}", rejection.body_text()))
}

/// A string field, or "" when absent. Numeric ids are accepted as strings.
fn string_field(body: &Value, name: &str) -> String {
    match body.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
