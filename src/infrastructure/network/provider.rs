// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::is_websocket_url;
use crate::domain::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use url::Url;

pub type CheckNodeProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    /// Provider for the reference node; WS when the URL says so, HTTP otherwise.
    pub async fn check_node(uri: &str) -> Result<CheckNodeProvider, AppError> {
        if is_websocket_url(uri) {
            Self::ws(uri).await
        } else {
            Self::http(uri)
        }
    }

    pub fn http(rpc_url: &str) -> Result<CheckNodeProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {e}")))?;
        Ok(RootProvider::new_http(url))
    }

    pub async fn ws(ws_url: &str) -> Result<CheckNodeProvider, AppError> {
        RootProvider::connect(ws_url)
            .await
            .map_err(|e| AppError::Connection(format!("WS connection failed: {e}")))
    }
}
