// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event record sent to the backend and its wire encoding.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EventError, Result};
use crate::interface::Interface;
use crate::tags::Tags;

/// Platform reported for every event produced by this SDK.
pub const PLATFORM: &str = "rust";

/// Logger name used when neither the event nor the client names one.
pub const DEFAULT_LOGGER: &str = "root";

/// Arbitrary structured data attached to an event.
pub type Extra = serde_json::Map<String, serde_json::Value>;

static HOSTNAME: LazyLock<String> = LazyLock::new(|| {
	hostname::get()
		.map(|h| h.to_string_lossy().to_string())
		.unwrap_or_default()
});

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
	Debug,
	Info,
	Warning,
	Error,
	Fatal,
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
			Self::Fatal => write!(f, "fatal"),
		}
	}
}

impl FromStr for Level {
	type Err = EventError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" => Ok(Self::Fatal),
			_ => Err(EventError::InvalidLevel(s.to_string())),
		}
	}
}

/// UTC event time, encoded as `YYYY-MM-DDTHH:MM:SS.ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
	pub fn now() -> Self {
		Self(Utc::now())
	}

	pub fn as_datetime(&self) -> DateTime<Utc> {
		self.0
	}
}

impl From<DateTime<Utc>> for Timestamp {
	fn from(time: DateTime<Utc>) -> Self {
		Self(time)
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Leap seconds report more than 1e9 nanos; keep two digits.
		let centis = (self.0.timestamp_subsec_nanos() / 10_000_000).min(99);
		write!(f, "{}.{centis:02}", self.0.format("%Y-%m-%dT%H:%M:%S"))
	}
}

impl FromStr for Timestamp {
	type Err = EventError;

	fn from_str(s: &str) -> Result<Self> {
		NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
			.map(|naive| Self(naive.and_utc()))
			.map_err(|_| EventError::InvalidTimestamp(s.to_string()))
	}
}

impl Serialize for Timestamp {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Generates a random event id: 16 bytes from the OS generator laid out as a
/// version 4 UUID and rendered as 32 hex digits.
pub fn new_event_id() -> Result<String> {
	let mut bytes = [0u8; 16];
	OsRng.try_fill_bytes(&mut bytes)?;
	Ok(uuid::Builder::from_random_bytes(bytes)
		.into_uuid()
		.simple()
		.to_string())
}

/// Facts about the running process recorded on every new event.
pub fn runtime_extra() -> Extra {
	let mut extra = Extra::new();
	set_runtime_extra(&mut extra);
	extra
}

fn set_runtime_extra(extra: &mut Extra) {
	let handle = tokio::runtime::Handle::try_current().ok();
	let parallelism = handle
		.as_ref()
		.map(|h| h.metrics().num_workers())
		.or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
		.unwrap_or(1);
	let tasks = handle
		.as_ref()
		.map(|h| h.metrics().num_alive_tasks())
		.unwrap_or(0);

	extra.insert(
		"runtime.version".to_string(),
		env!("LOOM_SENTRY_RUSTC_VERSION").into(),
	);
	extra.insert("runtime.num_cpu".to_string(), num_cpus::get().into());
	extra.insert("runtime.parallelism".to_string(), parallelism.into());
	extra.insert("runtime.num_tasks".to_string(), tasks.into());
}

/// A single event as it travels to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
	#[serde(default)]
	pub message: String,

	#[serde(default)]
	pub event_id: String,
	#[serde(default)]
	pub project: String,
	#[serde(default)]
	pub timestamp: Option<Timestamp>,
	#[serde(default)]
	pub level: Option<Level>,
	#[serde(default)]
	pub logger: String,

	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub platform: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub culprit: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub server_name: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub release: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub environment: String,
	#[serde(default, skip_serializing_if = "Tags::is_empty")]
	pub tags: Tags,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub modules: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub fingerprint: Vec<String>,
	#[serde(default, skip_serializing_if = "Extra::is_empty")]
	pub extra: Extra,

	#[serde(skip)]
	pub interfaces: Vec<Interface>,
}

impl Event {
	/// Creates an event with the given message and runtime extras.
	pub fn new(message: impl Into<String>) -> Self {
		Self::with_interfaces(message, Vec::new())
	}

	pub fn with_interfaces(message: impl Into<String>, interfaces: Vec<Interface>) -> Self {
		Self::with_extra(message, Extra::new(), interfaces)
	}

	/// Creates an event carrying caller-supplied extras; runtime facts are
	/// added on top.
	pub fn with_extra(
		message: impl Into<String>,
		mut extra: Extra,
		interfaces: Vec<Interface>,
	) -> Self {
		set_runtime_extra(&mut extra);
		Self {
			message: message.into(),
			extra,
			interfaces,
			..Default::default()
		}
	}

	/// Appends tags in iteration order.
	pub fn add_tags<'a, I>(&mut self, tags: I)
	where
		I: IntoIterator<Item = (&'a String, &'a String)>,
	{
		self.tags.extend(tags.into_iter().map(|(k, v)| (k.as_str(), v.as_str())));
	}

	/// Fills required fields that are still empty. Fields that already hold a
	/// value are never touched.
	pub fn normalize(&mut self, project: &str) -> Result<()> {
		if self.project.is_empty() {
			self.project = project.to_string();
		}
		if self.event_id.is_empty() {
			self.event_id = new_event_id()?;
		}
		if self.timestamp.is_none() {
			self.timestamp = Some(Timestamp::now());
		}
		if self.level.is_none() {
			self.level = Some(Level::Error);
		}
		if self.logger.is_empty() {
			self.logger = DEFAULT_LOGGER.to_string();
		}
		if self.server_name.is_empty() {
			self.server_name = HOSTNAME.clone();
		}
		if self.platform.is_empty() {
			self.platform = PLATFORM.to_string();
		}
		if self.culprit.is_empty() {
			if let Some(culprit) = self
				.interfaces
				.iter()
				.filter_map(Interface::culprit)
				.find(|c| !c.is_empty())
			{
				self.culprit = culprit;
			}
		}
		Ok(())
	}

	/// Encodes the event for the wire. Interfaces are written as extra
	/// top-level members keyed by class; a later interface replaces an
	/// earlier one with the same class.
	pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
		let mut json = serde_json::to_vec(self)?;

		let interfaces: BTreeMap<&'static str, &Interface> =
			self.interfaces.iter().map(|i| (i.class(), i)).collect();
		if interfaces.is_empty() {
			return Ok(json);
		}

		let spliced = serde_json::to_vec(&interfaces)?;
		// `{...}` + `{...}` -> `{...,...}`
		json.pop();
		json.push(b',');
		json.extend_from_slice(&spliced[1..]);
		Ok(json)
	}
}
