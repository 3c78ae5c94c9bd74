// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/reply protocol between the coordinator and handlers.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Each request is `{"method": ..., "params": ...}`; each reply is a
//! `{"success": bool, ...}` envelope. Exactly one request may be
//! outstanding per socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod call;
mod client;
mod frame;
mod registration;

pub use call::{CallReply, CallRequest};
pub use client::WireClient;
pub use frame::{
    decode, encode, read_frame, read_message, write_frame, write_message, WireError,
    MAX_FRAME_LEN,
};
pub use registration::{
    RegisterParams, RegistrationRequest, ReportStatusParams, UnregisterParams,
};

/// Default send/receive timeout for one call.
pub const DEFAULT_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
