//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the results/odds feed token) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub betting: BettingConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origin: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BettingConfig {
    /// Smallest accepted stake, in USDC.
    pub min_stake: Decimal,
    /// Largest accepted stake, in USDC.
    pub max_stake: Decimal,
    /// Relative odds drift above which a bet is rejected with `odds_changed`.
    pub odds_drift_tolerance: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub nonce_ttl_secs: u64,
    pub session_ttl_secs: u64,
    /// Env var holding the bearer token for feed endpoints.
    pub feed_token_env: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve the feed token from its configured env var.
    pub fn feed_token(&self) -> Result<SecretString> {
        let raw = std::env::var(&self.auth.feed_token_env)
            .with_context(|| format!("Environment variable not set: {}", self.auth.feed_token_env))?;
        Ok(SecretString::new(raw))
    }
}
