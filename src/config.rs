//! Service configuration.
//!
//! Read from a TOML file; every field has a default, so an empty file (or
//! no file) is a valid configuration.
//!
//! ```toml
//! bind_address = "0.0.0.0:5000"
//! api_root = "/api"
//! log_level = "info"
//!
//! [session]
//! cookie_name = "session-key"
//!
//! [accounts]
//! bcrypt_cost = 12
//!
//! [api]
//! index = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (`host:port`).
    pub bind_address: String,

    /// Prefix of every API path.
    pub api_root: String,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub session: SessionConfig,
    pub accounts: AccountsConfig,
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_owned(),
            api_root: "/api".to_owned(),
            log_level: "info".to_owned(),
            session: SessionConfig::default(),
            accounts: AccountsConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session key.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cookie_name: "session-key".to_owned() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// bcrypt work factor for stored passwords.
    pub bcrypt_cost: u32,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self { bcrypt_cost: bcrypt::DEFAULT_COST }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the API documentation at `api_root`.
    pub index: bool,
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }
}
