// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire transport for events.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use loom_sentry_core::Event;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{Result, SendError, SentryError};

/// SDK name for identification.
pub const SDK_NAME: &str = "loom-sentry-rust";
/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request header carrying the DSN credentials.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";
/// Response header the backend uses to explain a rejection.
pub const ERROR_HEADER: &str = "X-Sentry-Error";

/// Bodies larger than this many bytes are deflated.
pub const COMPRESSION_THRESHOLD: usize = 1000;

/// Default timeout for one delivery request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Value of the `User-Agent` header.
pub fn user_agent() -> String {
	format!("{SDK_NAME}/{SDK_VERSION}")
}

/// Delivers one event to the backend.
///
/// The client calls this from its single worker, one event at a time.
/// Implementations can be swapped in through the client builder, e.g. to
/// record events in tests.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(
		&self,
		url: &str,
		auth_header: &str,
		event: &Event,
	) -> std::result::Result<(), SendError>;
}

/// An encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
	pub body: Vec<u8>,
	pub content_type: &'static str,
	pub content_encoding: Option<&'static str>,
}

/// Encodes an event as JSON, deflating it when it is large enough for
/// compression to pay off.
pub fn encode_event(event: &Event) -> std::result::Result<EncodedEvent, SendError> {
	let json = event.to_json()?;
	if json.len() <= COMPRESSION_THRESHOLD {
		return Ok(EncodedEvent {
			body: json,
			content_type: "application/json",
			content_encoding: None,
		});
	}

	let mut encoder = ZlibEncoder::new(Vec::with_capacity(json.len() / 2), Compression::best());
	encoder.write_all(&json).map_err(SendError::Compression)?;
	let body = encoder.finish().map_err(SendError::Compression)?;
	Ok(EncodedEvent {
		body,
		content_type: "application/octet-stream",
		content_encoding: Some("deflate"),
	})
}

/// Posts events to the store endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
}

impl HttpTransport {
	/// Creates a transport whose requests give up after `timeout`.
	pub fn new(timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(SentryError::HttpClient)?;
		Ok(Self { client })
	}

	/// Wraps an existing HTTP client.
	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(
		&self,
		url: &str,
		auth_header: &str,
		event: &Event,
	) -> std::result::Result<(), SendError> {
		if url.is_empty() {
			debug!(event_id = %event.event_id, "No DSN configured, discarding event");
			return Ok(());
		}

		let encoded = encode_event(event)?;
		let mut request = self
			.client
			.post(url)
			.header(AUTH_HEADER, auth_header)
			.header(USER_AGENT, user_agent())
			.header(CONTENT_TYPE, encoded.content_type);
		if let Some(encoding) = encoded.content_encoding {
			request = request.header(CONTENT_ENCODING, encoding);
		}

		debug!(
			url = %url,
			event_id = %event.event_id,
			bytes = encoded.body.len(),
			compressed = encoded.content_encoding.is_some(),
			"Sending event"
		);
		let response = request.body(encoded.body).send().await?;

		let status = response.status();
		let sentry_error = response
			.headers()
			.get(ERROR_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default()
			.to_string();

		// Read the body to the end so the connection can be reused.
		if let Err(e) = response.bytes().await {
			debug!(error = %e, "Error while draining response body");
		}

		if status != StatusCode::OK {
			return Err(SendError::Status {
				status: status.as_u16(),
				sentry_error,
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flate2::read::ZlibDecoder;
	use std::io::Read;

	fn event_with_message_len(len: usize) -> Event {
		Event {
			message: "x".repeat(len),
			event_id: "0".repeat(32),
			..Default::default()
		}
	}

	/// Pads the message until the encoded event is exactly `target` bytes.
	fn event_of_encoded_len(target: usize) -> Event {
		let base = event_with_message_len(0).to_json().unwrap().len();
		let event = event_with_message_len(target - base);
		assert_eq!(event.to_json().unwrap().len(), target);
		event
	}

	#[test]
	fn small_events_are_sent_as_json() {
		let event = event_of_encoded_len(COMPRESSION_THRESHOLD);
		let encoded = encode_event(&event).unwrap();
		assert_eq!(encoded.content_type, "application/json");
		assert_eq!(encoded.content_encoding, None);
		assert_eq!(encoded.body, event.to_json().unwrap());
	}

	#[test]
	fn large_events_are_deflated() {
		let event = event_of_encoded_len(COMPRESSION_THRESHOLD + 1);
		let encoded = encode_event(&event).unwrap();
		assert_eq!(encoded.content_type, "application/octet-stream");
		assert_eq!(encoded.content_encoding, Some("deflate"));
		assert!(encoded.body.len() < COMPRESSION_THRESHOLD);

		let mut inflated = Vec::new();
		ZlibDecoder::new(encoded.body.as_slice())
			.read_to_end(&mut inflated)
			.unwrap();
		assert_eq!(inflated, event.to_json().unwrap());
	}

	proptest::proptest! {
		#[test]
		fn body_is_deflated_only_above_threshold(len in 0usize..3000) {
			let event = event_with_message_len(len);
			let json = event.to_json().unwrap();
			let encoded = encode_event(&event).unwrap();

			proptest::prop_assert_eq!(
				encoded.content_encoding.is_some(),
				json.len() > COMPRESSION_THRESHOLD
			);
			let body = if encoded.content_encoding.is_some() {
				let mut inflated = Vec::new();
				ZlibDecoder::new(encoded.body.as_slice())
					.read_to_end(&mut inflated)
					.unwrap();
				inflated
			} else {
				encoded.body
			};
			proptest::prop_assert_eq!(body, json);
		}
	}

	#[test]
	fn user_agent_names_sdk_and_version() {
		assert_eq!(user_agent(), format!("loom-sentry-rust/{}", env!("CARGO_PKG_VERSION")));
	}

	#[tokio::test]
	async fn empty_url_is_a_no_op() {
		let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
		let result = transport.send("", "", &event_with_message_len(10)).await;
		assert!(result.is_ok());
	}
}
