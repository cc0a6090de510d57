//! Best-effort fan-out of trip events to the hosted pub/sub service.
//!
//! Subscribers treat any message on `trip-{id}` as a cue to refetch, so the
//! payload is advisory and a dropped publish only delays their refresh.

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Serialize;

use crate::auth::signature;
use crate::config::PubSubConfig;

pub const TRIP_UPDATE: &str = "trip-update";
pub const COLLABORATOR_UPDATE: &str = "collaborator-update";
pub const USER_PRESENCE: &str = "user-presence";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("publish request failed: {0}")]
    Transport(String),

    #[error("publish rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError>;
}

pub fn trip_channel(trip_id: &str) -> String {
    format!("trip-{trip_id}")
}

/// Publishes to the trip's channel, logging instead of failing.
pub async fn notify_trip(
    notifier: &dyn Notifier,
    trip_id: &str,
    event: &str,
    payload: serde_json::Value,
) {
    let channel = trip_channel(trip_id);
    if let Err(e) = notifier.publish(&channel, event, &payload).await {
        tracing::warn!("Failed to publish {event} on {channel}: {e}");
    }
}

/// Used when no pub/sub service is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::debug!(%channel, %event, %payload, "pub/sub not configured, event dropped");
        Ok(())
    }
}

#[derive(Serialize)]
struct PublishBody<'a> {
    name: &'a str,
    channel: &'a str,
    data: String,
}

pub struct HttpNotifier {
    client: reqwest::Client,
    config: PubSubConfig,
}

impl HttpNotifier {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn events_path(&self) -> String {
        format!("/apps/{}/events", self.config.app_id)
    }

    /// Query string carrying the key, timestamp, body MD5 and signature.
    ///
    /// The signature is the hex HMAC-SHA256 of `POST\n{path}\n{params}`,
    /// with params sorted by name as the service expects.
    fn signed_query(&self, body: &str, timestamp: i64) -> Result<String, NotifyError> {
        let body_md5 = hex::encode(Md5::digest(body.as_bytes()));
        let params = format!(
            "auth_key={}&auth_timestamp={timestamp}&auth_version=1.0&body_md5={body_md5}",
            self.config.key
        );
        let to_sign = format!("POST\n{}\n{params}", self.events_path());
        let mac = signature::hmac_sha256(self.config.secret.as_bytes(), to_sign.as_bytes())
            .map_err(|e| NotifyError::Transport(format!("cannot sign publish: {e}")))?;
        Ok(format!("{params}&auth_signature={}", hex::encode(mac)))
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = serde_json::to_string(&PublishBody {
            name: event,
            channel,
            data: payload.to_string(),
        })
        .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let query = self.signed_query(&body, chrono::Utc::now().timestamp())?;
        let url = format!("{}{}?{query}", self.config.url, self.events_path());

        let res = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        tracing::debug!(%channel, %event, "event published");
        Ok(())
    }
}
