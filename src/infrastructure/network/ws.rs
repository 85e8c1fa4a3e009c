// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{parse_b256_hex, parse_hex_bytes};
use crate::domain::error::AppError;
use crate::infrastructure::network::connector::{Frame, SourceStream};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, http::HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// The three subscription request shapes upstreams speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsFlavor {
    /// `eth_subscribe` / `newPendingTransactions`: hash notifications.
    PendingHashes,
    /// `eth_subscribe` / `newPendingTransactions, true`: full tx objects.
    PendingFull,
    /// bloXroute `subscribe` / `newTxs` envelope with raw bytes included.
    BloxrouteTxs,
}

pub struct WsSource {
    url: String,
    tag: String,
    flavor: WsFlavor,
    auth_header: Option<String>,
    socket: Option<WsSocket>,
    // Notifications that raced ahead of the subscription ack.
    pending: VecDeque<Frame>,
}

impl WsSource {
    /// Self-hosted EL node; the URL doubles as the raw source tag.
    pub fn node(url: &str) -> Self {
        Self {
            url: url.to_string(),
            tag: url.to_string(),
            flavor: WsFlavor::PendingHashes,
            auth_header: None,
            socket: None,
            pending: VecDeque::new(),
        }
    }

    pub fn bloxroute(url: &str, auth_header: &str) -> Self {
        Self {
            url: url.to_string(),
            tag: "blx".to_string(),
            flavor: WsFlavor::BloxrouteTxs,
            auth_header: Some(auth_header.to_string()),
            socket: None,
            pending: VecDeque::new(),
        }
    }

    pub fn eden(url: &str, auth_header: &str) -> Self {
        Self {
            url: url.to_string(),
            tag: "eden".to_string(),
            flavor: WsFlavor::PendingFull,
            auth_header: Some(auth_header.to_string()),
            socket: None,
            pending: VecDeque::new(),
        }
    }

    fn subscribe_request(&self) -> Value {
        match self.flavor {
            WsFlavor::PendingHashes => json!({
                "jsonrpc": "2.0",
                "id": SUBSCRIBE_REQUEST_ID,
                "method": "eth_subscribe",
                "params": ["newPendingTransactions"],
            }),
            WsFlavor::PendingFull => json!({
                "jsonrpc": "2.0",
                "id": SUBSCRIBE_REQUEST_ID,
                "method": "eth_subscribe",
                "params": ["newPendingTransactions", true],
            }),
            WsFlavor::BloxrouteTxs => json!({
                "jsonrpc": "2.0",
                "id": SUBSCRIBE_REQUEST_ID,
                "method": "subscribe",
                "params": ["newTxs", {"include": ["tx_hash", "raw_tx"]}],
            }),
        }
    }

    fn socket_mut(&mut self) -> Result<&mut WsSocket, AppError> {
        self.socket
            .as_mut()
            .ok_or_else(|| AppError::Connection("websocket not connected".into()))
    }

    fn parse_frame(&self, text: &str) -> Frame {
        let incoming: WsIncoming = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return Frame::Malformed(format!("bad json: {e}")),
        };

        if let Some(err) = incoming.error {
            return Frame::Malformed(format!("upstream error frame: {err}"));
        }

        if let Some(params) = incoming.params
            && let Some(result) = params.result
        {
            return parse_notification(self.flavor, &result);
        }

        // A bare `result` outside `params` is a request response (late ack).
        if incoming.result.is_some() {
            return Frame::Heartbeat;
        }

        Frame::Malformed("unexpected frame shape".into())
    }
}

fn parse_notification(flavor: WsFlavor, result: &Value) -> Frame {
    match flavor {
        WsFlavor::PendingHashes => match result.as_str().and_then(parse_b256_hex) {
            Some(hash) => Frame::Hash(hash),
            None => Frame::Malformed("expected hash string notification".into()),
        },
        WsFlavor::PendingFull => {
            if let Some(hash) = result.as_str().and_then(parse_b256_hex) {
                return Frame::Hash(hash);
            }
            let Some(obj) = result.as_object() else {
                return Frame::Malformed("expected tx object notification".into());
            };
            if let Some(raw) = obj
                .get("rawTx")
                .or_else(|| obj.get("raw"))
                .and_then(Value::as_str)
                .and_then(parse_hex_bytes)
            {
                return Frame::Raw(raw);
            }
            match obj.get("hash").and_then(Value::as_str).and_then(parse_b256_hex) {
                Some(hash) => Frame::Hash(hash),
                None => Frame::Malformed("tx object without hash".into()),
            }
        }
        WsFlavor::BloxrouteTxs => {
            let Some(obj) = result.as_object() else {
                return Frame::Malformed("expected newTxs object".into());
            };
            if let Some(raw) = obj
                .get("rawTx")
                .and_then(Value::as_str)
                .and_then(parse_hex_bytes)
            {
                return Frame::Raw(raw);
            }
            match obj
                .get("txHash")
                .and_then(Value::as_str)
                .and_then(parse_b256_hex)
            {
                Some(hash) => Frame::Hash(hash),
                None => Frame::Malformed("newTxs without rawTx or txHash".into()),
            }
        }
    }
}

#[async_trait]
impl SourceStream for WsSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn connect(&mut self) -> Result<(), AppError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::Config(format!("invalid websocket URL {}: {e}", self.url)))?;

        if let Some(token) = &self.auth_header {
            let value = HeaderValue::from_str(token)
                .map_err(|_| AppError::Auth("auth header is not valid ASCII".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = connect_async(request).await.map_err(classify_ws_error)?;
        self.socket = Some(socket);
        self.pending.clear();
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<(), AppError> {
        let request = self.subscribe_request().to_string();
        self.socket_mut()?
            .send(Message::Text(request.into()))
            .await
            .map_err(|e| AppError::Connection(format!("subscribe send failed: {e}")))?;

        // Wait for the ack; notifications may already interleave.
        loop {
            let msg = self
                .socket_mut()?
                .next()
                .await
                .ok_or_else(|| AppError::Connection("socket closed during subscribe".into()))?
                .map_err(classify_ws_error)?;

            let Message::Text(text) = msg else { continue };
            let incoming: WsIncoming = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Some(err) = incoming.error {
                return Err(AppError::Protocol(format!("subscription refused: {err}")));
            }
            if let Some(params) = incoming.params
                && let Some(result) = params.result
            {
                let frame = parse_notification(self.flavor, &result);
                self.pending.push_back(frame);
                continue;
            }
            if incoming.result.is_some() {
                return Ok(());
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, AppError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }

        loop {
            let msg = self
                .socket_mut()?
                .next()
                .await
                .ok_or_else(|| AppError::Connection("websocket stream ended".into()))?
                .map_err(classify_ws_error)?;

            match msg {
                Message::Text(text) => return Ok(self.parse_frame(&text)),
                Message::Ping(payload) => {
                    let _ = self.socket_mut()?.send(Message::Pong(payload)).await;
                    return Ok(Frame::Heartbeat);
                }
                Message::Pong(_) => return Ok(Frame::Heartbeat),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Ok(self.parse_frame(text)),
                    Err(_) => return Ok(Frame::Malformed("non-utf8 binary frame".into())),
                },
                Message::Close(_) => {
                    return Err(AppError::Connection("server closed websocket".into()));
                }
                Message::Frame(_) => return Ok(Frame::Malformed("unexpected raw frame".into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        self.pending.clear();
    }
}

fn classify_ws_error(err: WsError) -> AppError {
    match err {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            AppError::Auth(format!("upgrade rejected with {}", response.status()))
        }
        other => AppError::Connection(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    params: Option<WsParams>,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(default)]
    result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    const HASH: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa01";

    #[test]
    fn hash_notification_parses() {
        let source = WsSource::node("ws://localhost:8546");
        let text = format!(
            r#"{{"jsonrpc":"2.0","method":"eth_subscription","params":{{"subscription":"0x9ce5","result":"{HASH}"}}}}"#
        );
        match source.parse_frame(&text) {
            Frame::Hash(h) => assert_eq!(h, parse_b256_hex(HASH).unwrap()),
            other => panic!("expected hash frame, got {other:?}"),
        }
    }

    #[test]
    fn full_notification_prefers_raw_bytes() {
        let source = WsSource::eden("wss://speed-eu.edennetwork.io", "token");
        let text = format!(
            r#"{{"params":{{"result":{{"hash":"{HASH}","rawTx":"0x02aabb"}}}}}}"#
        );
        match source.parse_frame(&text) {
            Frame::Raw(bytes) => assert_eq!(bytes.as_ref(), &[0x02, 0xaa, 0xbb]),
            other => panic!("expected raw frame, got {other:?}"),
        }
    }

    #[test]
    fn full_notification_falls_back_to_hash() {
        let source = WsSource::eden("wss://speed-eu.edennetwork.io", "token");
        let text = format!(r#"{{"params":{{"result":{{"hash":"{HASH}","nonce":"0x1"}}}}}}"#);
        match source.parse_frame(&text) {
            Frame::Hash(h) => assert_eq!(h, parse_b256_hex(HASH).unwrap()),
            other => panic!("expected hash frame, got {other:?}"),
        }
    }

    #[test]
    fn bloxroute_envelope_parses_tx_hash() {
        let source = WsSource::bloxroute("wss://api.blxrbdn.com/ws", "token");
        let text = format!(
            r#"{{"params":{{"subscription":"abc","result":{{"txHash":"{HASH}"}}}}}}"#
        );
        match source.parse_frame(&text) {
            Frame::Hash(h) => assert_eq!(h, parse_b256_hex(HASH).unwrap()),
            other => panic!("expected hash frame, got {other:?}"),
        }
    }

    #[test]
    fn subscription_ack_is_heartbeat() {
        let source = WsSource::node("ws://localhost:8546");
        let text = r#"{"jsonrpc":"2.0","id":1,"result":"0x9ce59a13059e417087c02d3236a0b1cc"}"#;
        assert!(matches!(source.parse_frame(text), Frame::Heartbeat));
    }

    #[test]
    fn garbage_and_error_frames_are_malformed() {
        let source = WsSource::node("ws://localhost:8546");
        assert!(matches!(
            source.parse_frame("not json at all"),
            Frame::Malformed(_)
        ));
        assert!(matches!(
            source.parse_frame(r#"{"error":{"code":-32000,"message":"nope"}}"#),
            Frame::Malformed(_)
        ));
        assert!(matches!(
            source.parse_frame(r#"{"params":{"result":"0x1234"}}"#),
            Frame::Malformed(_)
        ));
    }

    #[test]
    fn node_tag_is_its_url() {
        let source = WsSource::node("ws://10.0.0.5:8546");
        assert_eq!(source.tag(), "ws://10.0.0.5:8546");
        assert_eq!(WsSource::bloxroute("wss://x", "t").tag(), "blx");
        assert_eq!(WsSource::eden("wss://x", "t").tag(), "eden");
    }

    #[test]
    fn hash_alias_sanity() {
        // 31-byte strings must not parse as a hash
        assert!(parse_b256_hex("0xabcd").is_none());
        assert_eq!(
            parse_b256_hex(HASH),
            Some(B256::from_slice(&parse_hex_bytes(HASH).unwrap()))
        );
    }
}
