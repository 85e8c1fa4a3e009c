// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::infrastructure::network::connector::{Frame, SourceStream};
use alloy::primitives::Bytes;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

/// Raw-TCP source: length-prefixed frames, each one a full tx envelope.
/// Push-only; there is no subscription handshake.
pub struct FramedTcpSource {
    url: String,
    reader: Option<FramedRead<TcpStream, LengthDelimitedCodec>>,
}

impl FramedTcpSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            reader: None,
        }
    }

    fn host_port(&self) -> &str {
        self.url.strip_prefix("tcp://").unwrap_or(&self.url)
    }
}

#[async_trait]
impl SourceStream for FramedTcpSource {
    fn tag(&self) -> &str {
        &self.url
    }

    async fn connect(&mut self) -> Result<(), AppError> {
        let stream = TcpStream::connect(self.host_port())
            .await
            .map_err(|e| AppError::Connection(format!("tcp connect to {} failed: {e}", self.url)))?;
        self.reader = Some(FramedRead::new(stream, LengthDelimitedCodec::new()));
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, AppError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| AppError::Connection("tcp source not connected".into()))?;

        match reader.next().await {
            Some(Ok(frame)) if frame.is_empty() => Ok(Frame::Malformed("empty frame".into())),
            Some(Ok(frame)) => Ok(Frame::Raw(Bytes::from(frame.to_vec()))),
            Some(Err(e)) => Err(AppError::Connection(format!("tcp read failed: {e}"))),
            None => Err(AppError::Connection("tcp stream ended".into())),
        }
    }

    async fn close(&mut self) {
        self.reader = None;
    }
}
