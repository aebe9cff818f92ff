//! Route handlers.
//!
//! Each handler reads the current `GuardSettings` snapshot once and passes
//! owned data into the validators. Rate limiting has already happened in
//! middleware by the time these run.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::request::{header_text, owner_id, FILE_NAME_HEADER};
use crate::http::response::{rejected, ApiError, FileVerdict, UrlVerdict};
use crate::http::server::AppState;
use crate::ordering::{AppliedOrder, OrderableEntity, ReorderItem};
use crate::security::{
    sanitize_for_prompt, strip_markup, validate_text, validate_url, UploadCandidate,
};

/// Upper bound on free-text request bodies, before any sanitizing.
pub const MAX_TEXT_INPUT_CHARS: usize = 100_000;

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub text: String,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    pub updated: Vec<AppliedOrder>,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<OrderableEntity>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn validate_url_handler(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> Response {
    match validate_url(&request.url) {
        Ok(url) => Json(UrlVerdict {
            valid: true,
            sanitized_url: Some(url.as_str().to_string()),
            ..UrlVerdict::default()
        })
        .into_response(),
        Err(rejection) => {
            let expose = state.settings.load().security.expose_rejection_details;
            rejected(&rejection, expose)
        }
    }
}

pub async fn strip_text_handler(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> Response {
    match validate_text("text", &request.text, 1, MAX_TEXT_INPUT_CHARS) {
        Ok(text) => Json(TextResponse {
            text: strip_markup(&text),
        })
        .into_response(),
        Err(rejection) => {
            rejected(&rejection, state.settings.load().security.expose_rejection_details)
        }
    }
}

/// Client may lower the limit, never raise it above the configured maximum.
pub async fn sanitize_prompt_handler(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Response {
    let settings = state.settings.load();
    let text = match validate_text("text", &request.text, 1, MAX_TEXT_INPUT_CHARS) {
        Ok(text) => text,
        Err(rejection) => return rejected(&rejection, settings.security.expose_rejection_details),
    };
    let configured = settings.prompts.max_chars;
    let max_chars = request.max_length.map_or(configured, |n| n.min(configured));
    Json(TextResponse {
        text: sanitize_for_prompt(&text, max_chars),
    })
    .into_response()
}

pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let settings = state.settings.load_full();
    let name = header_text(&headers, FILE_NAME_HEADER).to_string();
    let mime = header_text(&headers, axum::http::header::CONTENT_TYPE.as_str()).to_string();

    // Hashing and signature checks are CPU-bound on up to max_size_bytes.
    let validator_settings = settings.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        validator_settings.uploads.validate(&UploadCandidate {
            name: &name,
            declared_mime: &mime,
            size_bytes: body.len() as u64,
            bytes: &body,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("upload validation task failed: {}", e)))?;

    Ok(match outcome {
        Ok(record) => {
            tracing::info!(
                file = %record.sanitized_filename,
                kind = ?record.content_kind,
                size = record.size_bytes,
                "Upload accepted"
            );
            Json(FileVerdict::from(&record)).into_response()
        }
        Err(rejection) => rejected(&rejection, settings.security.expose_rejection_details),
    })
}

pub async fn list_items_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ItemsResponse>, ApiError> {
    let owner = owner_id(&headers).ok_or(ApiError::MissingOwner)?;
    let items = state.ordering.store().list_current(&owner).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn reorder_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, ApiError> {
    let owner = owner_id(&headers).ok_or(ApiError::MissingOwner)?;
    let accepted = state.ordering.reorder(&owner, &request.items).await?;
    Ok(Json(ReorderResponse {
        updated: accepted.updated,
    }))
}
