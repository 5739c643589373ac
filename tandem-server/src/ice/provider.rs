use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_core::{IceServer, IceServerConfig, SessionId};
use thiserror::Error;
use tracing::{debug, warn};

/// Source of the traversal servers handed to each new relay connection.
#[async_trait]
pub trait IceServerSource: Send + Sync {
    async fn ice_servers(&self, session_id: SessionId) -> IceServerConfig;
}

/// Always returns the same list.
#[derive(Debug, Clone, Default)]
pub struct StaticIceServers(pub IceServerConfig);

#[async_trait]
impl IceServerSource for StaticIceServers {
    async fn ice_servers(&self, _session_id: SessionId) -> IceServerConfig {
        self.0.clone()
    }
}

#[derive(Debug, Error)]
enum IceFetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("credential service answered {0}")]
    Status(reqwest::StatusCode),

    #[error("credential service refused: {0}")]
    Rejected(String),

    #[error("undecodable response: {0}")]
    Body(serde_json::Error),
}

#[derive(Serialize)]
struct CredentialRequest {
    format: &'static str,
}

#[derive(Deserialize)]
#[serde(tag = "s", content = "v", rename_all = "lowercase")]
enum CredentialResponse {
    Ok {
        #[serde(rename = "iceServers")]
        ice_servers: OneOrMany,
    },
    Error(serde_json::Value),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(IceServer),
    Many(Vec<IceServer>),
}

impl From<OneOrMany> for IceServerConfig {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(server) => IceServerConfig(vec![server]),
            OneOrMany::Many(servers) => IceServerConfig(servers),
        }
    }
}

/// Fetches short-lived TURN credentials from an external service and falls
/// back to the public STUN entry whenever that does not work out.
#[derive(Debug, Clone)]
pub struct IceServerProvider {
    client: reqwest::Client,
    turn_origin: Option<String>,
    turn_token: Option<String>,
}

impl IceServerProvider {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(turn_origin: Option<String>, turn_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {e:#}");
                reqwest::Client::new()
            });

        Self {
            client,
            turn_origin,
            turn_token,
        }
    }

    /// Never fails: every error degrades to [`IceServerConfig::default_servers`].
    pub async fn get_ice_servers(&self) -> IceServerConfig {
        let (Some(origin), Some(token)) = (&self.turn_origin, &self.turn_token) else {
            return IceServerConfig::default_servers();
        };

        match self.fetch(origin, token).await {
            Ok(config) if !config.is_empty() => {
                debug!("Fetched {} ICE server(s) from {}", config.len(), origin);
                config
            }
            Ok(_) => {
                warn!("Credential service at {} returned no servers, using default", origin);
                IceServerConfig::default_servers()
            }
            Err(e) => {
                warn!("Falling back to default ICE servers: {}", e);
                IceServerConfig::default_servers()
            }
        }
    }

    async fn fetch(&self, origin: &str, token: &str) -> Result<IceServerConfig, IceFetchError> {
        let response = self
            .client
            .put(origin)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", general_purpose::STANDARD.encode(token)),
            )
            .json(&CredentialRequest { format: "urls" })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IceFetchError::Status(response.status()));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice(&body).map_err(IceFetchError::Body)? {
            CredentialResponse::Ok { ice_servers } => Ok(ice_servers.into()),
            CredentialResponse::Error(message) => Err(IceFetchError::Rejected(match message {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            })),
        }
    }
}

#[async_trait]
impl IceServerSource for IceServerProvider {
    async fn ice_servers(&self, session_id: SessionId) -> IceServerConfig {
        debug!("Resolving ICE servers for session {}", session_id);
        self.get_ice_servers().await
    }
}
