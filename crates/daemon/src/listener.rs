// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration listener.
//!
//! A framed request/reply endpoint accepting `register`, `report_status`,
//! `unregister`, and `ping` from handlers. Malformed messages are answered
//! with `{success: false, error}` and never mutate state. The only shared
//! state is the registry; every connection runs in its own task.

use crate::bus::Bus;
use crate::registry::HandlerRegistry;
use cw_core::{Clock, HandlerStatus, SchedulerEvent};
use cw_wire::{
    read_message, write_message, CallReply, CallRequest, RegistrationRequest, WireError,
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct RegistrationServer<C: Clock> {
    registry: Arc<HandlerRegistry<C>>,
    bus: Bus,
}

impl<C: Clock> RegistrationServer<C> {
    pub fn new(registry: Arc<HandlerRegistry<C>>, bus: Bus) -> Self {
        Self { registry, bus }
    }

    /// Accept registration connections until cancelled.
    pub async fn run(self, listener: TcpListener, cancel: CancellationToken) {
        let server = Arc::new(self);
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "registration listener up");
        }
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let server = Arc::clone(&server);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, cancel).await;
                    });
                }
                Err(e) => error!("registration accept error: {e}"),
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
                        let reply = CallReply::err(format!("malformed request: {e}"));
                        if write_message(&mut stream, &reply).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    Err(_) => return,
                },
            };

            let reply = self.dispatch(&request);
            if write_message(&mut stream, &reply).await.is_err() {
                return;
            }
        }
    }

    fn dispatch(&self, request: &CallRequest) -> CallReply {
        let decoded = match RegistrationRequest::from_call(request) {
            Ok(decoded) => decoded,
            Err(e) => return CallReply::err(e),
        };
        match decoded {
            RegistrationRequest::Register(p) => {
                match self.registry.register(&p.handler_id, &p.address, p.methods) {
                    Ok(()) => {
                        self.bus.publish_local(SchedulerEvent::HandlerRegistered {
                            handler_id: p.handler_id,
                            address: p.address,
                        });
                        CallReply::ok_empty()
                    }
                    Err(e) => CallReply::err(e.to_string()),
                }
            }
            RegistrationRequest::ReportStatus(p) => {
                let status: HandlerStatus = match p.status.parse() {
                    Ok(status) => status,
                    Err(e) => return CallReply::err(e),
                };
                match self.registry.report_status(&p.handler_id, status) {
                    Ok(()) => CallReply::ok_empty(),
                    Err(e) => CallReply::err(e.to_string()),
                }
            }
            RegistrationRequest::Unregister(p) => {
                match self.registry.unregister(&p.handler_id) {
                    Ok(()) => {
                        self.bus.publish_local(SchedulerEvent::HandlerUnregistered {
                            handler_id: p.handler_id,
                        });
                        CallReply::ok_empty()
                    }
                    Err(e) => CallReply::err(e.to_string()),
                }
            }
            RegistrationRequest::Ping => {
                debug!("registration ping");
                CallReply::ok(serde_json::Value::String("pong".to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
