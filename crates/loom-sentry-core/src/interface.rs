// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured sub-sections of an event.
//!
//! Each variant is written into the top-level event object under its class
//! tag, next to the event's own fields.

use serde::{Deserialize, Serialize};

use crate::context::{RequestContext, UserContext};
use crate::stacktrace::Stacktrace;

/// A typed payload attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Interface {
	Message(Message),
	Exception(Exception),
	Stacktrace(Stacktrace),
	Http(RequestContext),
	User(UserContext),
}

impl Interface {
	/// Key the payload occupies in the serialized event.
	pub fn class(&self) -> &'static str {
		match self {
			Self::Message(_) => "logentry",
			Self::Exception(_) => "exception",
			Self::Stacktrace(_) => "stacktrace",
			Self::Http(_) => "request",
			Self::User(_) => "user",
		}
	}

	/// Code location blamed for the event, for payloads that carry one.
	pub fn culprit(&self) -> Option<String> {
		match self {
			Self::Exception(exception) => exception.culprit(),
			Self::Stacktrace(stacktrace) => stacktrace.culprit(),
			Self::Message(_) | Self::Http(_) | Self::User(_) => None,
		}
	}
}

impl From<Message> for Interface {
	fn from(message: Message) -> Self {
		Self::Message(message)
	}
}

impl From<Exception> for Interface {
	fn from(exception: Exception) -> Self {
		Self::Exception(exception)
	}
}

impl From<Stacktrace> for Interface {
	fn from(stacktrace: Stacktrace) -> Self {
		Self::Stacktrace(stacktrace)
	}
}

impl From<RequestContext> for Interface {
	fn from(request: RequestContext) -> Self {
		Self::Http(request)
	}
}

impl From<UserContext> for Interface {
	fn from(user: UserContext) -> Self {
		Self::User(user)
	}
}

/// A log message, optionally with format parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub message: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub params: Vec<serde_json::Value>,
}

impl Message {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			params: Vec::new(),
		}
	}
}

/// An error or panic, with the stack trace where it was raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
	#[serde(rename = "type")]
	pub exception_type: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

impl Exception {
	pub fn new(exception_type: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			exception_type: exception_type.into(),
			value: value.into(),
			module: None,
			stacktrace: None,
		}
	}

	pub fn with_module(mut self, module: impl Into<String>) -> Self {
		self.module = Some(module.into());
		self
	}

	pub fn with_stacktrace(mut self, stacktrace: Stacktrace) -> Self {
		self.stacktrace = Some(stacktrace);
		self
	}

	pub fn culprit(&self) -> Option<String> {
		self.stacktrace.as_ref().and_then(Stacktrace::culprit)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stacktrace::Frame;

	#[test]
	fn message_serializes_without_wrapper() {
		let value = serde_json::to_value(Interface::from(Message::new("boom"))).unwrap();
		assert_eq!(value, serde_json::json!({"message": "boom"}));
	}

	#[test]
	fn exception_uses_type_key() {
		let value =
			serde_json::to_value(Interface::from(Exception::new("io::Error", "denied"))).unwrap();
		assert_eq!(value, serde_json::json!({"type": "io::Error", "value": "denied"}));
	}

	#[test]
	fn only_stack_carrying_payloads_have_culprits() {
		let trace = Stacktrace::new(vec![Frame {
			function: Some("app::run".to_string()),
			in_app: true,
			..Default::default()
		}]);
		let exception = Interface::from(Exception::new("panic", "oops").with_stacktrace(trace.clone()));

		assert_eq!(exception.culprit().as_deref(), Some("app::run"));
		assert_eq!(Interface::from(trace).culprit().as_deref(), Some("app::run"));
		assert_eq!(Interface::from(Message::new("hi")).culprit(), None);
		assert_eq!(Interface::from(UserContext::with_id("u1")).culprit(), None);
		assert_eq!(Interface::from(RequestContext::new("GET", "/")).culprit(), None);
	}

	#[test]
	fn class_tags_are_distinct() {
		let classes = [
			Interface::from(Message::default()).class(),
			Interface::from(Exception::default()).class(),
			Interface::from(Stacktrace::default()).class(),
			Interface::from(RequestContext::default()).class(),
			Interface::from(UserContext::default()).class(),
		];
		let unique: std::collections::HashSet<_> = classes.iter().collect();
		assert_eq!(unique.len(), classes.len());
	}
}
