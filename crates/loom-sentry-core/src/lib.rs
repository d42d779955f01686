// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom Sentry-protocol SDK.
//!
//! This crate holds everything about an event that does not involve I/O:
//! the event record and its wire encoding, ordered tags, the typed
//! sub-sections (message, exception, stack trace, request, user) and DSN
//! parsing. The delivery pipeline lives in `loom-sentry`.

pub mod context;
pub mod dsn;
pub mod error;
pub mod event;
pub mod interface;
pub mod stacktrace;
pub mod tags;

pub use context::{RequestContext, UserContext};
pub use dsn::Dsn;
pub use error::{DsnError, EventError, Result};
pub use event::{new_event_id, runtime_extra, Event, Extra, Level, Timestamp};
pub use interface::{Exception, Interface, Message};
pub use stacktrace::{Frame, Stacktrace};
pub use tags::{Tag, Tags};
