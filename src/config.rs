use std::env;
use std::net::SocketAddr;

use crate::error::ConfigError;

pub const DEFAULT_DATABASE: &str = "OpenSplit";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub bind: SocketAddr,
    pub session_secret: String,
    pub session_token: Option<String>,
    pub allowed_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mongodb_uri = var("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?;
        let session_secret =
            var("OPENSPLIT_SESSION_SECRET").ok_or(ConfigError::Missing("OPENSPLIT_SESSION_SECRET"))?;
        let bind = var("OPENSPLIT_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                name: "OPENSPLIT_BIND",
                reason: err.to_string(),
            })?;

        Ok(Config {
            mongodb_uri,
            database: var("OPENSPLIT_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            bind,
            session_secret,
            session_token: var("OPENSPLIT_SESSION_TOKEN"),
            allowed_origin: var("OPENSPLIT_ALLOWED_ORIGIN"),
        })
    }
}
