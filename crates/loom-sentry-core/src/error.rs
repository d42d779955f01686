// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the event model and DSN parsing.

use thiserror::Error;

/// Errors raised while building or normalizing an event.
#[derive(Debug, Error)]
pub enum EventError {
	#[error("secure random source unavailable: {0}")]
	RandomUnavailable(#[from] rand::Error),

	#[error("invalid severity level: {0}")]
	InvalidLevel(String),

	#[error("invalid timestamp: {0}")]
	InvalidTimestamp(String),
}

/// Errors raised while parsing a DSN.
#[derive(Debug, Error)]
pub enum DsnError {
	#[error("malformed DSN: {0}")]
	InvalidUrl(#[from] url::ParseError),

	#[error("DSN missing public key")]
	MissingPublicKey,

	#[error("DSN key is not valid UTF-8 once decoded: {0}")]
	InvalidKeyEncoding(String),

	#[error("DSN missing project id")]
	MissingProjectId,

	#[error("DSN project id is not numeric: {0}")]
	InvalidProjectId(String),
}

/// Result type for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
