// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User identity and HTTP request snapshots attached to events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The user affected by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// IP address (sensitive - not displayed by default)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
}

impl UserContext {
	pub fn with_id(id: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			..Default::default()
		}
	}
}

/// The HTTP request being served when an event was captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
	pub url: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub query_string: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cookies: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
}

impl RequestContext {
	pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			url: url.into(),
			..Default::default()
		}
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}
}
