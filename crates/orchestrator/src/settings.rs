//! Runtime settings loaded from the environment.

use std::time::Duration;

/// Signing configuration for task-scoped bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Task token lifetime in minutes (default: 60).
    pub expiry_mins: i64,
}

/// Default task token expiry in minutes.
const DEFAULT_TOKEN_EXPIRY_MINS: i64 = 60;

impl TokenConfig {
    /// Load token configuration from environment variables.
    ///
    /// | Env Var                    | Required | Default |
    /// |----------------------------|----------|---------|
    /// | `NIMBUS_TOKEN_SECRET`      | **yes**  | --      |
    /// | `NIMBUS_TOKEN_EXPIRY_MINS` | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `NIMBUS_TOKEN_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret = std::env::var("NIMBUS_TOKEN_SECRET")
            .expect("NIMBUS_TOKEN_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "NIMBUS_TOKEN_SECRET must not be empty");

        let expiry_mins: i64 = std::env::var("NIMBUS_TOKEN_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_EXPIRY_MINS.to_string())
            .parse()
            .expect("NIMBUS_TOKEN_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            expiry_mins,
        }
    }
}

/// Coordinates and credentials for the provider gateway that fronts
/// EC2 clusters. Absent when only traditional clusters are in play.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl GatewaySettings {
    /// Load gateway settings, or `None` when `NIMBUS_GATEWAY_URL` is
    /// unset.
    ///
    /// # Panics
    ///
    /// Panics if the URL is set but the credentials are missing.
    fn from_env() -> Option<Self> {
        let base_url = std::env::var("NIMBUS_GATEWAY_URL").ok()?;
        let username = std::env::var("NIMBUS_GATEWAY_USERNAME")
            .expect("NIMBUS_GATEWAY_USERNAME must be set when NIMBUS_GATEWAY_URL is");
        let password = std::env::var("NIMBUS_GATEWAY_PASSWORD")
            .expect("NIMBUS_GATEWAY_PASSWORD must be set when NIMBUS_GATEWAY_URL is");
        Some(Self {
            base_url,
            username,
            password,
        })
    }
}

/// Default externally-reachable API base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";
/// Default remote-call timeout in seconds.
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 60;

/// All runtime settings the orchestrators and worker need.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL embedded into log-sink and config addresses handed to
    /// tasks.
    pub base_url: String,
    /// Bound applied to every remote call a task makes.
    pub remote_timeout_secs: u64,
    pub token: TokenConfig,
    pub gateway: Option<GatewaySettings>,
}

impl Settings {
    /// Load all settings from environment variables.
    ///
    /// | Env Var                       | Required | Default                        |
    /// |-------------------------------|----------|--------------------------------|
    /// | `NIMBUS_BASE_URL`             | no       | `http://localhost:8080/api/v1` |
    /// | `NIMBUS_REMOTE_TIMEOUT_SECS`  | no       | `60`                           |
    ///
    /// Token and gateway variables are documented on [`TokenConfig`] and
    /// [`GatewaySettings`].
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("NIMBUS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let remote_timeout_secs: u64 = std::env::var("NIMBUS_REMOTE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REMOTE_TIMEOUT_SECS.to_string())
            .parse()
            .expect("NIMBUS_REMOTE_TIMEOUT_SECS must be a valid u64");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            remote_timeout_secs,
            token: TokenConfig::from_env(),
            gateway: GatewaySettings::from_env(),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}
