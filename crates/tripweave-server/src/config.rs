use std::env;

#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub url: String,
    pub app_id: String,
    pub key: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub cors_origin: String,
    pub app_url: String,
    /// Shared secret the identity gateway signs caller assertions with.
    pub identity_shared_secret: Option<String>,
    pub webhook_signing_secret: Option<String>,
    pub pubsub: Option<PubSubConfig>,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|e| format!("SERVER_PORT must be a valid port number: {e}"))?;

        let pubsub = match (
            env::var("PUBSUB_URL").ok(),
            env::var("PUBSUB_APP_ID").ok(),
            env::var("PUBSUB_KEY").ok(),
            env::var("PUBSUB_SECRET").ok(),
        ) {
            (Some(url), Some(app_id), Some(key), Some(secret)) => Some(PubSubConfig {
                url: url.trim_end_matches('/').to_string(),
                app_id,
                key,
                secret,
            }),
            _ => None,
        };

        Ok(Self {
            server_port,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/tripweave.db".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            app_url: env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            identity_shared_secret: env::var("IDENTITY_SHARED_SECRET").ok(),
            webhook_signing_secret: env::var("WEBHOOK_SIGNING_SECRET").ok(),
            pubsub,
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| "tripweave/0.1".to_string()),
        })
    }

    /// Shareable link for a pending invitation.
    pub fn invite_link(&self, token: &str) -> String {
        format!("{}/invite/{token}", self.app_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            app_url: "http://localhost:3000".to_string(),
            identity_shared_secret: None,
            webhook_signing_secret: None,
            pubsub: None,
            geocoder_url: "http://127.0.0.1:9".to_string(),
            geocoder_user_agent: "tripweave-tests".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_link_joins_without_double_slash() {
        let mut config = Config::for_tests();
        config.app_url = "https://trips.example.com/".to_string();
        assert_eq!(
            config.invite_link("abc123"),
            "https://trips.example.com/invite/abc123"
        );
    }
}
