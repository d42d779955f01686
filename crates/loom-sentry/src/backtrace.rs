// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack trace capture for error and panic events.

use std::backtrace::Backtrace;
use std::collections::HashMap;

use loom_sentry_core::{Frame, Stacktrace};
use rustc_demangle::try_demangle;

/// Source lines recorded on each side of an in-app frame's line.
const CONTEXT_LINES: usize = 3;

/// Captures the current call stack, oldest call first.
///
/// Frames whose file lives under one of `include_paths` are marked in-app and
/// get a filename relative to that path. Without a matching include path a
/// frame is in-app unless it belongs to the standard library, a common
/// runtime crate or this SDK.
pub fn capture_backtrace(include_paths: &[String]) -> Stacktrace {
	let backtrace = Backtrace::force_capture();
	parse_backtrace(&format!("{backtrace:#}"), include_paths)
}

/// Parses the alternate `Display` output of [`Backtrace`].
pub fn parse_backtrace(rendered: &str, include_paths: &[String]) -> Stacktrace {
	let mut frames: Vec<Frame> = Vec::new();
	// Locations only belong to the frame line right above them.
	let mut attach = false;

	for line in rendered.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut().filter(|_| attach) {
				apply_location(frame, location, include_paths);
			}
			continue;
		}

		match parse_frame_line(line) {
			Some(frame) => {
				frames.push(frame);
				attach = true;
			}
			None => attach = false,
		}
	}

	// The innermost frames are capture and unwinding machinery.
	let skip = frames
		.iter()
		.take_while(|frame| frame.function.as_deref().is_some_and(is_capture_frame))
		.count();
	frames.drain(..skip);

	let mut sources = SourceCache::default();
	for frame in frames.iter_mut().filter(|frame| frame.in_app) {
		sources.fill_context(frame);
	}

	frames.reverse();
	Stacktrace::new(frames)
}

/// Parses a frame line, `N: function` or `N: 0x<address> - function`.
fn parse_frame_line(line: &str) -> Option<Frame> {
	let (index, symbol) = line.split_once(':')?;
	index.trim().parse::<u32>().ok()?;

	let symbol = strip_address(symbol.trim());
	if symbol.is_empty() || symbol == "<unknown>" {
		return None;
	}
	let function = clean_symbol(&strip_crate_tags(symbol));

	// e.g. "my_app::handlers::process" -> "my_app::handlers"
	let module = module_path(&function);
	let in_app = is_in_app_frame(&function);

	Some(Frame {
		function: Some(function),
		module,
		in_app,
		..Default::default()
	})
}

/// Drops the `0x<address> - ` column printed ahead of the symbol.
fn strip_address(symbol: &str) -> &str {
	match symbol.split_once(" - ") {
		Some((address, rest))
			if address
				.strip_prefix("0x")
				.is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())) =>
		{
			rest.trim_start()
		}
		_ => symbol,
	}
}

/// Removes `[<hex>]` crate disambiguators, e.g. `std[e28293b1aa0f68bd]::env`
/// becomes `std::env`. Brackets not attached to an identifier are kept.
fn strip_crate_tags(symbol: &str) -> String {
	let mut out = String::with_capacity(symbol.len());
	let mut rest = symbol;
	while let Some(open) = rest.find('[') {
		let (head, tail) = rest.split_at(open);
		out.push_str(head);
		let attached = head
			.chars()
			.next_back()
			.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
		match tail[1..].find(']') {
			Some(close)
				if attached
					&& close > 0 && tail[1..=close].chars().all(|c| c.is_ascii_hexdigit()) =>
			{
				rest = &tail[close + 2..];
			}
			_ => {
				out.push('[');
				rest = &tail[1..];
			}
		}
	}
	out.push_str(rest);
	out
}

/// Demangles a symbol and strips the trailing `::h<hash>` segment.
fn clean_symbol(symbol: &str) -> String {
	if let Ok(demangled) = try_demangle(symbol) {
		return format!("{demangled:#}");
	}
	match symbol.rsplit_once("::h") {
		Some((path, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
			path.to_string()
		}
		_ => symbol.to_string(),
	}
}

fn module_path(function: &str) -> Option<String> {
	if function.starts_with('<') {
		return None;
	}
	let path = without_generic_args(function);
	path
		.rfind("::")
		.map(|idx| path[..idx].to_string())
		.filter(|module| !module.is_empty())
}

/// Cuts a trailing `::<...>` turbofish, which may itself contain paths.
fn without_generic_args(function: &str) -> &str {
	let bytes = function.as_bytes();
	let mut depth = 0usize;
	for (i, &b) in bytes.iter().enumerate() {
		match b {
			b'<' => depth += 1,
			b'>' if i > 0 && bytes[i - 1] == b'-' => {}
			b'>' => depth = depth.saturating_sub(1),
			b':' if depth == 0 && function[i..].starts_with("::<") => return &function[..i],
			_ => {}
		}
	}
	function
}

/// A lone in-app frame for a `path:line:col` location, for when no symbolized
/// backtrace is available.
pub(crate) fn location_frame(location: &str, include_paths: &[String]) -> Frame {
	let mut frame = Frame {
		in_app: true,
		..Default::default()
	};
	apply_location(&mut frame, location, include_paths);
	frame
}

/// Applies an `at path:line:col` location to the frame above it.
fn apply_location(frame: &mut Frame, location: &str, include_paths: &[String]) {
	let mut parts = location.rsplitn(3, ':');
	let (path, lineno, colno) = match (parts.next(), parts.next(), parts.next()) {
		(Some(col), Some(line), Some(path)) => match (line.parse().ok(), col.parse().ok()) {
			(Some(line), Some(col)) => (path, Some(line), Some(col)),
			_ => (location, None, None),
		},
		_ => (location, None, None),
	};

	frame.abs_path = Some(path.to_string());
	frame.lineno = lineno;
	frame.colno = colno;

	match include_paths
		.iter()
		.filter(|prefix| !prefix.is_empty())
		.find_map(|prefix| path.strip_prefix(prefix.as_str()))
	{
		Some(relative) => {
			frame.filename = Some(relative.trim_start_matches('/').to_string());
			frame.in_app = true;
		}
		None => frame.filename = Some(path.to_string()),
	}
}

/// Whether a frame belongs to backtrace collection, panic dispatch or this SDK.
fn is_capture_frame(function: &str) -> bool {
	const CAPTURE_PREFIXES: &[&str] = &[
		"std::backtrace",
		"<std::backtrace",
		"std::panicking::",
		"core::panicking::",
		"std::sys::backtrace::",
		"rust_begin_unwind",
		"__rustc::rust_begin_unwind",
		"__rust_try",
		"<alloc::boxed::Box<F,A> as core::ops::function::Fn",
		"loom_sentry::",
		"<loom_sentry::",
	];
	CAPTURE_PREFIXES
		.iter()
		.any(|prefix| function.starts_with(prefix))
}

/// Determine if a frame is from user application code vs standard library.
fn is_in_app_frame(function: &str) -> bool {
	const SYSTEM_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"async_trait::",
		"tracing::",
		"<tracing::",
		"loom_sentry::",
		"<loom_sentry::",
		"panic_unwind::",
		"<panic_unwind::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_try",
		"__rust_",
		"__rustc::",
		"_rust_",
		"__libc_",
		"_start",
	];

	const SYSTEM_CONTAINS: &[&str] = &[
		"::panic::",
		"::panicking::",
		"::rt::",
		"::sys_common::",
		" as core::ops::function::",
	];

	// The C entry point the Rust runtime is started from.
	if function == "main" {
		return false;
	}

	!SYSTEM_PREFIXES.iter().any(|prefix| function.starts_with(prefix))
		&& !SYSTEM_CONTAINS.iter().any(|needle| function.contains(needle))
}

/// Reads each source file at most once per capture.
#[derive(Default)]
struct SourceCache {
	files: HashMap<String, Option<Vec<String>>>,
}

impl SourceCache {
	fn fill_context(&mut self, frame: &mut Frame) {
		let (Some(path), Some(lineno)) = (frame.abs_path.as_deref(), frame.lineno) else {
			return;
		};
		let lines = self
			.files
			.entry(path.to_string())
			.or_insert_with(|| {
				std::fs::read_to_string(path)
					.ok()
					.map(|source| source.lines().map(str::to_string).collect())
			})
			.as_deref();
		let Some(lines) = lines else {
			return;
		};

		let idx = lineno as usize;
		if idx == 0 || idx > lines.len() {
			return;
		}
		let idx = idx - 1;
		frame.context_line = Some(lines[idx].clone());
		frame.pre_context = lines[idx.saturating_sub(CONTEXT_LINES)..idx].to_vec();
		frame.post_context = lines[idx + 1..(idx + 1 + CONTEXT_LINES).min(lines.len())].to_vec();
	}
}
