// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::process::Command;

fn main() {
	let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
	let version = Command::new(rustc)
		.arg("--version")
		.output()
		.ok()
		.and_then(|output| String::from_utf8(output.stdout).ok())
		.map(|version| version.trim().to_string())
		.filter(|version| !version.is_empty())
		.unwrap_or_else(|| "unknown".to_string());

	println!("cargo:rustc-env=LOOM_SENTRY_RUSTC_VERSION={version}");
	println!("cargo:rerun-if-env-changed=RUSTC");
}
