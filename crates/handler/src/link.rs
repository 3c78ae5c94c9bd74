// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration link from a handler to its coordinator.

use cw_wire::{RegisterParams, ReportStatusParams, UnregisterParams, WireClient, WireError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("coordinator rejected the request: {0}")]
    Rejected(String),
}

/// Client side of the coordinator's registration endpoint.
pub struct CoordinatorLink {
    client: WireClient,
}

impl CoordinatorLink {
    pub fn new(coordinator_addr: impl Into<String>) -> Self {
        Self { client: WireClient::new(coordinator_addr) }
    }

    /// Announce the handler: id, reply-socket address, advertised methods.
    pub async fn register(
        &mut self,
        handler_id: &str,
        address: &str,
        methods: Vec<String>,
    ) -> Result<(), HandlerError> {
        let params = RegisterParams {
            handler_id: handler_id.to_string(),
            address: address.to_string(),
            methods,
        };
        self.send("register", serde_json::to_value(&params).map_err(WireError::from)?).await?;
        info!(handler_id, address, "registered with coordinator");
        Ok(())
    }

    pub async fn report_status(
        &mut self,
        handler_id: &str,
        status: &str,
    ) -> Result<(), HandlerError> {
        let params =
            ReportStatusParams { handler_id: handler_id.to_string(), status: status.to_string() };
        self.send("report_status", serde_json::to_value(&params).map_err(WireError::from)?)
            .await
    }

    pub async fn unregister(&mut self, handler_id: &str) -> Result<(), HandlerError> {
        let params = UnregisterParams { handler_id: handler_id.to_string() };
        self.send("unregister", serde_json::to_value(&params).map_err(WireError::from)?).await
    }

    pub async fn ping(&mut self) -> Result<(), HandlerError> {
        self.client.ping().await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.client.close().await;
    }

    async fn send(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), HandlerError> {
        let reply = self.client.call(method, params).await?;
        if !reply.success {
            return Err(HandlerError::Rejected(reply.error_message().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "link_tests.rs"]
mod tests;
