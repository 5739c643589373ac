use crate::error::ConfigError;
use std::env;
use std::net::SocketAddr;

pub const LISTEN_ENV: &str = "TANDEM_LISTEN";
pub const TURN_ORIGIN_ENV: &str = "TURN_ORIGIN";
pub const TURN_TOKEN_ENV: &str = "TURN_TOKEN";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// Traversal-credential endpoint. Without it (or the token) sessions get
    /// the default STUN list.
    pub turn_origin: Option<String>,
    pub turn_token: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            turn_origin: None,
            turn_token: None,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var(LISTEN_ENV) {
            config.listen_addr = value
                .parse()
                .map_err(|source| ConfigError::ListenAddr { value, source })?;
        }
        config.turn_origin = non_empty(env::var(TURN_ORIGIN_ENV).ok());
        config.turn_token = non_empty(env::var(TURN_TOKEN_ENV).ok());

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
