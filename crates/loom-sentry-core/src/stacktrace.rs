// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack trace payloads.

use serde::{Deserialize, Serialize};

/// A stack trace, ordered oldest call first and crashing frame last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn new(frames: Vec<Frame>) -> Self {
		Self { frames }
	}

	/// The innermost in-app frame, rendered as a code location.
	pub fn culprit(&self) -> Option<String> {
		self
			.frames
			.iter()
			.rev()
			.filter(|frame| frame.in_app)
			.find_map(Frame::culprit)
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub abs_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context_line: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub pre_context: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub post_context: Vec<String>,
	#[serde(default)]
	pub in_app: bool,
}

impl Frame {
	fn culprit(&self) -> Option<String> {
		let function = self.function.as_deref().filter(|f| !f.is_empty());
		let module = self.module.as_deref().filter(|m| !m.is_empty());
		match (module, function) {
			(Some(module), Some(function)) if !function.starts_with(module) => {
				Some(format!("{module}::{function}"))
			}
			(_, Some(function)) => Some(function.to_string()),
			(Some(module), None) => Some(module.to_string()),
			(None, None) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn frame(module: &str, function: &str, in_app: bool) -> Frame {
		Frame {
			module: Some(module.to_string()),
			function: Some(function.to_string()),
			in_app,
			..Default::default()
		}
	}

	#[test]
	fn culprit_is_innermost_in_app_frame() {
		let trace = Stacktrace::new(vec![
			frame("my_app", "my_app::main", true),
			frame("my_app::handlers", "my_app::handlers::process", true),
			frame("core::panicking", "core::panicking::panic", false),
		]);
		assert_eq!(trace.culprit().as_deref(), Some("my_app::handlers::process"));
	}

	#[test]
	fn culprit_prefixes_module_for_short_function_names() {
		let trace = Stacktrace::new(vec![frame("my_app::db", "connect", true)]);
		assert_eq!(trace.culprit().as_deref(), Some("my_app::db::connect"));
	}

	#[test]
	fn no_culprit_without_in_app_frames() {
		let trace = Stacktrace::new(vec![frame("std::rt", "std::rt::lang_start", false)]);
		assert_eq!(trace.culprit(), None);
		assert_eq!(Stacktrace::default().culprit(), None);
	}

	#[test]
	fn frame_omits_empty_fields() {
		let json = serde_json::to_value(frame("m", "f", true)).unwrap();
		assert_eq!(json, serde_json::json!({"function": "f", "module": "m", "in_app": true}));
	}
}
