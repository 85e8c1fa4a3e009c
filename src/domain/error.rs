// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Transaction decode failed: {0}")]
    Decode(String),

    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Process exit code for fatal startup errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Io(_) => 2,
            _ => 1,
        }
    }
}
