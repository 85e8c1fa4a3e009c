// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::infrastructure::network::connector::{Frame, SourceStream};
use alloy::primitives::{B256, Bytes};
use async_trait::async_trait;
use std::time::Duration;
use tonic::Request;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status, Streaming};

const BLOXROUTE_STREAM_PATH: &str = "/gateway.Gateway/NewTxs";
const EDEN_STREAM_PATH: &str = "/eden.Eden/SubscribeNewTxs";
const CHAINBOUND_STREAM_PATH: &str = "/api.API/SubscribeNewTxs";

/// Initial subscription frame. Wire-compatible subset of the vendors'
/// published schemas; an empty filter subscribes to every pending tx.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TxStreamRequest {
    #[prost(string, tag = "1")]
    pub filter: String,
}

/// One streamed message: raw envelope bytes, or a bare hash for
/// hash-only feeds.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TxStreamMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub raw_tx: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

pub struct GrpcSource {
    endpoint_url: String,
    tag: String,
    api_key: String,
    stream_path: &'static str,
    channel: Option<Channel>,
    stream: Option<Streaming<TxStreamMessage>>,
}

impl GrpcSource {
    pub fn bloxroute(endpoint_url: &str, api_key: &str) -> Self {
        Self::new(endpoint_url, "blx", api_key, BLOXROUTE_STREAM_PATH)
    }

    pub fn eden(endpoint_url: &str, api_key: &str) -> Self {
        Self::new(endpoint_url, "eden", api_key, EDEN_STREAM_PATH)
    }

    pub fn chainbound(endpoint_url: &str, api_key: &str) -> Self {
        Self::new(endpoint_url, "chainbound", api_key, CHAINBOUND_STREAM_PATH)
    }

    fn new(endpoint_url: &str, tag: &str, api_key: &str, stream_path: &'static str) -> Self {
        Self {
            endpoint_url: endpoint_url.to_string(),
            tag: tag.to_string(),
            api_key: api_key.to_string(),
            stream_path,
            channel: None,
            stream: None,
        }
    }
}

#[async_trait]
impl SourceStream for GrpcSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn connect(&mut self) -> Result<(), AppError> {
        let endpoint = Endpoint::from_shared(self.endpoint_url.clone())
            .map_err(|e| AppError::Config(format!("invalid gRPC endpoint {}: {e}", self.endpoint_url)))?
            .connect_timeout(Duration::from_secs(10))
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(10))
            .keep_alive_while_idle(true);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| AppError::Connection(format!("gRPC connect failed: {e}")))?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<(), AppError> {
        let channel = self
            .channel
            .clone()
            .ok_or_else(|| AppError::Connection("gRPC channel not connected".into()))?;

        let mut grpc = Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| AppError::Connection(format!("gRPC not ready: {e}")))?;

        let mut request = Request::new(TxStreamRequest {
            filter: String::new(),
        });
        let key = self
            .api_key
            .parse()
            .map_err(|_| AppError::Auth("API key is not valid metadata".into()))?;
        request.metadata_mut().insert("authorization", key);

        let codec: ProstCodec<TxStreamRequest, TxStreamMessage> = ProstCodec::default();
        let path = PathAndQuery::from_static(self.stream_path);
        let response = grpc
            .server_streaming(request, path, codec)
            .await
            .map_err(classify_status)?;

        self.stream = Some(response.into_inner());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, AppError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AppError::Connection("gRPC stream not subscribed".into()))?;

        match stream.message().await {
            Ok(Some(msg)) => {
                if !msg.raw_tx.is_empty() {
                    Ok(Frame::Raw(Bytes::from(msg.raw_tx)))
                } else if msg.hash.len() == 32 {
                    Ok(Frame::Hash(B256::from_slice(&msg.hash)))
                } else {
                    Ok(Frame::Malformed("stream message without tx or hash".into()))
                }
            }
            // Server-initiated stream closure is a read error.
            Ok(None) => Err(AppError::Connection("server closed gRPC stream".into())),
            Err(status) => Err(classify_status(status)),
        }
    }

    async fn close(&mut self) {
        self.stream = None;
        self.channel = None;
    }
}

fn classify_status(status: Status) -> AppError {
    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied => {
            AppError::Auth(format!("gRPC status {}: {}", status.code(), status.message()))
        }
        _ => AppError::Connection(format!(
            "gRPC status {}: {}",
            status.code(),
            status.message()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_statuses_map_to_auth_errors() {
        let err = classify_status(Status::new(Code::Unauthenticated, "bad key"));
        assert!(matches!(err, AppError::Auth(_)));
        let err = classify_status(Status::new(Code::PermissionDenied, "no access"));
        assert!(matches!(err, AppError::Auth(_)));
        let err = classify_status(Status::new(Code::Unavailable, "gone"));
        assert!(matches!(err, AppError::Connection(_)));
    }

    #[test]
    fn vendor_constructors_set_tags_and_paths() {
        let blx = GrpcSource::bloxroute("https://gw.example:5005", "key");
        assert_eq!(blx.tag(), "blx");
        assert_eq!(blx.stream_path, BLOXROUTE_STREAM_PATH);

        let fiber = GrpcSource::chainbound("https://beta.fiberapi.io:8080", "key");
        assert_eq!(fiber.tag(), "chainbound");
        assert_eq!(fiber.stream_path, CHAINBOUND_STREAM_PATH);
    }
}
