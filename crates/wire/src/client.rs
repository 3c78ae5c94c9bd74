// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire client: one endpoint, one socket, one outstanding request.
//!
//! The socket follows a strict request/reply discipline. Any failure
//! (timeout, transport loss, malformed reply) poisons the socket; the next
//! call transparently rebuilds it when `auto_reconnect` is on (the default).
//! A stale-transport failure (peer closed the connection between calls) is
//! additionally retried once within the same call, invisibly to the caller.
//! Timeouts and malformed replies always surface.

use crate::call::{CallReply, CallRequest};
use crate::frame::{read_message, write_message, WireError};
use crate::DEFAULT_CALL_TIMEOUT;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub struct WireClient {
    address: String,
    timeout: Duration,
    auto_reconnect: bool,
    stream: Option<TcpStream>,
    closed: bool,
}

impl WireClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
            auto_reconnect: true,
            stream: None,
            closed: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.closed
    }

    /// Establish the transport. Idempotent; reopens a closed client.
    pub async fn connect(&mut self) -> Result<(), WireError> {
        self.closed = false;
        if self.stream.is_some() {
            return Ok(());
        }
        // Accept `tcp://host:port` as well as bare `host:port`.
        let target = self.address.strip_prefix("tcp://").unwrap_or(&self.address);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| WireError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!(address = %self.address, "wire client connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Serialize one request and wait for its reply, with the default timeout.
    pub async fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<CallReply, WireError> {
        self.call_with_timeout(method, params, self.timeout).await
    }

    /// Serialize one request and wait for its reply.
    pub async fn call_with_timeout(
        &mut self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallReply, WireError> {
        if self.closed {
            return Err(WireError::NotConnected);
        }
        if self.stream.is_none() {
            if !self.auto_reconnect {
                return Err(WireError::NotConnected);
            }
            self.connect().await?;
        }

        let request = CallRequest::new(method, params);
        match self.roundtrip(&request, timeout).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                // The request/reply discipline is broken; poison the socket.
                self.stream = None;
                if e.is_transport() && self.auto_reconnect {
                    // Stale socket: rebuild and retry exactly once.
                    warn!(address = %self.address, error = %e, "stale socket, rebuilding");
                    self.connect().await?;
                    match self.roundtrip(&request, timeout).await {
                        Ok(reply) => Ok(reply),
                        Err(e2) => {
                            self.stream = None;
                            Err(e2)
                        }
                    }
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn roundtrip(
        &mut self,
        request: &CallRequest,
        timeout: Duration,
    ) -> Result<CallReply, WireError> {
        let stream = self.stream.as_mut().ok_or(WireError::NotConnected)?;
        tokio::time::timeout(timeout, async {
            write_message(stream, request).await?;
            read_message(stream).await
        })
        .await
        .map_err(|_| WireError::Timeout)?
    }

    /// Liveness shortcut: `call("ping", {})`, expecting a pong back.
    pub async fn ping(&mut self) -> Result<String, WireError> {
        let reply = self.call("ping", serde_json::json!({})).await?;
        if !reply.success {
            return Err(WireError::UnexpectedReply(reply.error_message().to_string()));
        }
        Ok(reply
            .result
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or("pong")
            .to_string())
    }

    /// Release the transport gracefully. Further calls fail with `NotConnected`.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
    }

    /// Release the transport without a graceful shutdown.
    pub fn terminate(&mut self) {
        self.stream = None;
        self.closed = true;
    }
}

impl std::fmt::Debug for WireClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireClient")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
