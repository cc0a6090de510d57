use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::webhook;
use crate::error::{AppError, AppResult};
use crate::routes::AppState;
use crate::services::users;

#[derive(Debug, Deserialize)]
struct IdentityEvent {
    #[serde(rename = "type")]
    kind: String,
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    primary_email_address_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    id: Option<String>,
    email_address: String,
}

impl UserData {
    /// The primary address when flagged, otherwise the first one listed.
    fn email(&self) -> Option<&str> {
        self.email_addresses
            .iter()
            .find(|e| e.id.is_some() && e.id == self.primary_email_address_id)
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.as_str())
    }
}

fn required<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("Missing webhook signature headers".into()))
}

/// GET /api/webhooks/identity
pub async fn status() -> Json<Value> {
    Json(json!({ "message": "Identity webhook endpoint is working" }))
}

/// POST /api/webhooks/identity
///
/// Creates the local user on `user.created`. Events without an email address
/// and other event types are acknowledged and ignored.
pub async fn identity_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let secret = state
        .config
        .webhook_signing_secret
        .as_deref()
        .ok_or_else(|| AppError::Internal("WEBHOOK_SIGNING_SECRET is not set".into()))?;

    let msg_id = required(&headers, webhook::ID_HEADER)?;
    let timestamp = required(&headers, webhook::TIMESTAMP_HEADER)?;
    let signature = required(&headers, webhook::SIGNATURE_HEADER)?;

    match webhook::verify(
        secret,
        msg_id,
        timestamp,
        signature,
        &body,
        chrono::Utc::now().timestamp(),
    ) {
        Ok(()) => {}
        Err(webhook::WebhookError::BadSecret) => {
            return Err(AppError::Internal(
                "WEBHOOK_SIGNING_SECRET is not valid base64".into(),
            ))
        }
        Err(e) => {
            tracing::warn!("Rejected identity webhook {msg_id}: {e}");
            return Err(AppError::Validation("Invalid webhook signature".into()));
        }
    }

    let event: IdentityEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))?;

    if event.kind == "user.created" {
        let Some(email) = event.data.email().filter(|e| !e.trim().is_empty()) else {
            tracing::warn!("Skipping user.created for {} without an email address", event.data.id);
            return Ok(Json(json!({ "message": "Webhook processed successfully" })));
        };
        let conn = state.db.get()?;
        let created = users::insert_if_missing(
            &conn,
            &event.data.id,
            email,
            event.data.first_name.as_deref(),
            event.data.last_name.as_deref(),
        )?;
        if created {
            tracing::info!("Created user for {} from webhook", event.data.id);
        }
    } else {
        tracing::debug!("Ignoring identity webhook event {}", event.kind);
    }

    Ok(Json(json!({ "message": "Webhook processed successfully" })))
}
