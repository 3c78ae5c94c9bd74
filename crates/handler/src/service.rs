// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method table and serve loop.

use async_trait::async_trait;
use cw_wire::{read_message, write_message, CallReply, CallRequest, WireError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One callable method on a handler.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, String>;
}

struct FnMethod<F>(F);

#[async_trait]
impl<F> Method for FnMethod<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    async fn call(&self, params: Value) -> Result<Value, String> {
        (self.0)(params)
    }
}

/// A handler: an identifier plus a table of named methods, served over the
/// framed request/reply transport.
pub struct HandlerService {
    handler_id: String,
    methods: BTreeMap<String, Arc<dyn Method>>,
}

impl HandlerService {
    pub fn new(handler_id: impl Into<String>) -> Self {
        Self { handler_id: handler_id.into(), methods: BTreeMap::new() }
    }

    /// Register a synchronous method.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(FnMethod(f)));
        self
    }

    /// Register an async method.
    pub fn method_async(mut self, name: impl Into<String>, m: impl Method + 'static) -> Self {
        self.methods.insert(name.into(), Arc::new(m));
        self
    }

    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// Advertised method names: the registered table plus the built-in ping.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        if !self.methods.contains_key("ping") {
            names.push("ping".to_string());
        }
        names
    }

    /// Accept connections until cancelled, answering one reply per request.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        info!(handler_id = %self.handler_id, "handler serving");
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let service = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        service.handle_connection(stream, cancel).await;
                    });
                }
                Err(e) => error!(handler_id = %self.handler_id, "accept error: {e}"),
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, cancel: CancellationToken) {
        loop {
            let request: CallRequest = tokio::select! {
                _ = cancel.cancelled() => return,
                read = read_message(&mut stream) => match read {
                    Ok(request) => request,
                    Err(WireError::Malformed(e)) => {
                        // Reply in error and keep the request/reply cadence.
                        let reply = CallReply::err(format!("malformed request: {e}"));
                        if write_message(&mut stream, &reply).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    Err(_) => return,
                },
            };

            debug!(handler_id = %self.handler_id, method = %request.method, "request");
            let reply = self.dispatch(request).await;
            if write_message(&mut stream, &reply).await.is_err() {
                return;
            }
        }
    }

    async fn dispatch(&self, request: CallRequest) -> CallReply {
        if request.method == "ping" && !self.methods.contains_key("ping") {
            return CallReply::ok(Value::String("pong".to_string()));
        }
        match self.methods.get(&request.method) {
            Some(method) => match method.call(request.params).await {
                Ok(result) => CallReply::ok(result),
                Err(error) => CallReply::err(error),
            },
            None => CallReply::err(format!(
                "method '{}' not exposed by handler '{}'",
                request.method, self.handler_id
            )),
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
