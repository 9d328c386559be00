use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::CallError;
use crate::provider::CaptureOptions;

const DEFAULT_LIVEKIT_URL_TEMPLATE: &str = "wss://{app_id}.livekit.cloud";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CallConfig {
    pub capture: CaptureOptions,
    /// Initial value of the mic toggle when the session is created.
    pub mic_enabled_on_start: bool,
    /// `tracing` filter directive used by [`crate::logging::init_logging`].
    pub log_filter: Option<String>,
    pub livekit: LiveKitConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            mic_enabled_on_start: true,
            log_filter: None,
            livekit: LiveKitConfig::default(),
        }
    }
}

impl CallConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CallError> {
        serde_json::from_str(json).map_err(|e| CallError::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CallError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CallError::Config(format!("read {}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        tracing::debug!("loaded call config from {}", path.display());
        Ok(config)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LiveKitConfig {
    /// Server URL with `{app_id}` standing in for the application id.
    pub url_template: String,
    /// Key/secret pair used to mint a token when the user leaves it blank.
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Participant identity for minted tokens. Random when unset.
    pub identity: Option<String>,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_LIVEKIT_URL_TEMPLATE.to_string(),
            api_key: None,
            api_secret: None,
            identity: None,
        }
    }
}

impl LiveKitConfig {
    /// Resolve the WebSocket URL for an application id.
    pub fn server_url(&self, application_id: &str) -> Result<String, CallError> {
        let raw = self.url_template.replace("{app_id}", application_id.trim());
        let mut url = Url::parse(&raw)
            .map_err(|e| CallError::Config(format!("invalid server url {raw:?}: {e}")))?;

        let scheme = match url.scheme() {
            "wss" | "https" => "wss",
            "ws" | "http" => "ws",
            other => {
                return Err(CallError::Config(format!(
                    "unsupported server url scheme: {other}"
                )));
            }
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| CallError::Config(format!("cannot use scheme {scheme} for {raw}")))?;
        }
        Ok(url.to_string())
    }

    pub fn api_credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some((key, secret))
            }
            _ => None,
        }
    }
}
