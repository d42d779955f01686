// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Sentry SDK.

use loom_sentry_core::{DsnError, EventError};
use thiserror::Error;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, SentryError>;

/// Configuration errors, returned directly to the configuring call.
#[derive(Debug, Error)]
pub enum SentryError {
	/// The DSN could not be parsed.
	#[error("invalid DSN: {0}")]
	Dsn(#[from] DsnError),

	/// Sample rate outside `[0, 1]`.
	#[error("sample rate should be between 0 and 1, got {0}")]
	InvalidSampleRate(f32),

	/// An ignore-errors pattern failed to compile.
	#[error("failed to compile ignore pattern {pattern:?}: {source}")]
	InvalidIgnorePattern {
		/// The joined pattern that was compiled.
		pattern: String,
		/// Underlying regex error.
		#[source]
		source: regex::Error,
	},

	/// The HTTP client could not be constructed.
	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[source] reqwest::Error),
}

/// Delivery outcome errors, reported only through an event's completion.
#[derive(Debug, Error)]
pub enum SendError {
	/// The delivery queue was full or closed.
	#[error("packet dropped")]
	PacketDropped,

	/// The event could not be normalized.
	#[error("failed to prepare event: {0}")]
	Event(#[from] EventError),

	/// The event could not be encoded as JSON.
	#[error("failed to serialize event: {0}")]
	Serialization(#[from] serde_json::Error),

	/// The encoded event could not be compressed.
	#[error("failed to compress event: {0}")]
	Compression(#[source] std::io::Error),

	/// The request did not complete.
	#[error("HTTP request failed: {0}")]
	Request(#[from] reqwest::Error),

	/// The transport panicked while sending. The worker keeps running.
	#[error("transport panicked: {0}")]
	TransportPanicked(String),

	/// The backend answered with something other than 200.
	#[error("got http status {status} - x-sentry-error: {sentry_error}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Value of the `X-Sentry-Error` response header, if any.
		sentry_error: String,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_error_mentions_backend_reason() {
		let err = SendError::Status {
			status: 403,
			sentry_error: "event rejected".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"got http status 403 - x-sentry-error: event rejected"
		);
	}

	#[test]
	fn dsn_errors_convert() {
		let err: SentryError = DsnError::MissingProjectId.into();
		assert!(matches!(err, SentryError::Dsn(DsnError::MissingProjectId)));
	}
}
