// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::parse_boolish;
use crate::domain::error::AppError;
use config::{Config, Environment};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    // General. DEBUG=1 / LOG_PROD=1 toggles are read separately in load();
    // ambient shell vars (UID in particular) must not break deserialization.
    #[serde(skip)]
    pub debug: bool,
    #[serde(skip)]
    pub log_prod: bool,

    // Output
    #[serde(default)]
    pub out: Option<String>,
    #[serde(skip)]
    pub uid: Option<String>,

    // Sources
    #[serde(default = "default_nodes")]
    pub nodes: String,
    #[serde(default)]
    pub check_node_uri: Option<String>,
    #[serde(default)]
    pub blx_auth_header: Option<String>,
    #[serde(default)]
    pub eden_auth_header: Option<String>,
    #[serde(default)]
    pub chainbound_api_key: Option<String>,

    // Upstream endpoints (overridable for staging/regional gateways)
    #[serde(default = "default_blx_uri")]
    pub blx_uri: String,
    #[serde(default = "default_eden_uri")]
    pub eden_uri: String,
    #[serde(default = "default_chainbound_uri")]
    pub chainbound_uri: String,

    // Pipeline tuning
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_dedup_horizon_secs")]
    pub dedup_horizon_secs: u64,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_nodes() -> String {
    "ws://localhost:8546".to_string()
}
fn default_blx_uri() -> String {
    "wss://api.blxrbdn.com/ws".to_string()
}
fn default_eden_uri() -> String {
    "wss://speed-eu.edennetwork.io".to_string()
}
fn default_chainbound_uri() -> String {
    "https://beta.fiberapi.io:8080".to_string()
}
fn default_queue_capacity() -> usize {
    10_000
}
// One day of rotation plus a one-hour grace window.
fn default_dedup_horizon_secs() -> u64 {
    25 * 3600
}

impl Settings {
    pub fn load() -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut settings: Settings = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        if let Ok(raw) = std::env::var("DEBUG")
            && let Some(v) = parse_boolish(&raw)
        {
            settings.debug = v;
        }
        if let Ok(raw) = std::env::var("LOG_PROD")
            && let Some(v) = parse_boolish(&raw)
        {
            settings.log_prod = v;
        }

        Ok(settings)
    }

    pub fn node_urls(&self) -> Vec<String> {
        self.nodes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    pub fn uid_or_generate(&self) -> String {
        match self.uid.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(uid) => uid.to_string(),
            None => rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(char::from)
                .collect::<String>()
                .to_lowercase(),
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.node_urls().is_empty()
            || self.blx_auth_header.is_some()
            || self.eden_auth_header.is_some()
            || self.chainbound_api_key.is_some()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self
            .out
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .is_none()
        {
            return Err(AppError::Config(
                "No output directory set (use --out <path>)".into(),
            ));
        }
        if !self.has_sources() {
            return Err(AppError::Config(
                "No sources configured (use --nodes / --blx-token / --eden-token / --chainbound-api-key)".into(),
            ));
        }
        Ok(())
    }
}
