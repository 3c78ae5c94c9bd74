// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler-side library.
//!
//! A handler is a remote worker advertising a set of named methods. This
//! crate provides the serve loop speaking the framed request/reply protocol
//! (one reply per request, built-in `ping`) and the registration link for
//! announcing the handler to a coordinator.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod link;
mod service;

pub use link::{CoordinatorLink, HandlerError};
pub use service::{HandlerService, Method};
