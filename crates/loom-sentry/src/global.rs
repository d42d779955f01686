// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide default client.
//!
//! Built on first use from `SENTRY_DSN`, `SENTRY_RELEASE` and
//! `SENTRY_ENVIRONMENT`, and never torn down. Every function here delegates
//! to the matching [`Client`] method.

use std::collections::HashMap;
use std::error::Error;
use std::panic::UnwindSafe;
use std::sync::LazyLock;

use loom_sentry_core::{Event, Interface, RequestContext, UserContext};

use crate::client::{Captured, CapturedPanic, Client};
use crate::error::Result;

static DEFAULT_CLIENT: LazyLock<Client> = LazyLock::new(|| {
	Client::builder()
		.build()
		.expect("default sentry client should build from environment defaults")
});

/// The default client.
pub fn client() -> &'static Client {
	&DEFAULT_CLIENT
}

pub fn capture(event: Event, tags: &HashMap<String, String>) -> Captured {
	client().capture(event, tags)
}

pub fn capture_message(
	message: &str,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> Option<String> {
	client().capture_message(message, tags, interfaces)
}

pub async fn capture_message_and_wait(
	message: &str,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> Option<String> {
	client()
		.capture_message_and_wait(message, tags, interfaces)
		.await
}

pub fn capture_error<E>(
	error: &E,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> Option<String>
where
	E: Error + ?Sized,
{
	client().capture_error(error, tags, interfaces)
}

pub async fn capture_error_and_wait<E>(
	error: &E,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> Option<String>
where
	E: Error + ?Sized,
{
	client()
		.capture_error_and_wait(error, tags, interfaces)
		.await
}

pub fn capture_panic<F, R>(
	f: F,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> std::result::Result<R, CapturedPanic>
where
	F: FnOnce() -> R + UnwindSafe,
{
	client().capture_panic(f, tags, interfaces)
}

pub async fn capture_panic_and_wait<F, R>(
	f: F,
	tags: &HashMap<String, String>,
	interfaces: Vec<Interface>,
) -> std::result::Result<R, CapturedPanic>
where
	F: FnOnce() -> R + UnwindSafe,
{
	client()
		.capture_panic_and_wait(f, tags, interfaces)
		.await
}

pub fn set_dsn(dsn: &str) -> Result<()> {
	client().set_dsn(dsn)
}

pub fn url() -> String {
	client().url()
}

pub fn project_id() -> String {
	client().project_id()
}

pub fn set_release(release: impl Into<String>) {
	client().set_release(release);
}

pub fn release() -> String {
	client().release()
}

pub fn set_environment(environment: impl Into<String>) {
	client().set_environment(environment);
}

pub fn environment() -> String {
	client().environment()
}

pub fn set_default_logger_name(name: impl Into<String>) {
	client().set_default_logger_name(name);
}

pub fn set_sample_rate(rate: f32) -> Result<()> {
	client().set_sample_rate(rate)
}

pub fn set_ignore_errors<I, S>(patterns: I) -> Result<()>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	client().set_ignore_errors(patterns)
}

pub fn set_include_paths(paths: Vec<String>) {
	client().set_include_paths(paths);
}

pub fn include_paths() -> Vec<String> {
	client().include_paths()
}

pub fn set_tag(key: impl Into<String>, value: impl Into<String>) {
	client().set_tag(key, value);
}

pub fn remove_tag(key: &str) {
	client().remove_tag(key);
}

pub fn set_user_context(user: impl Into<Option<UserContext>>) {
	client().set_user_context(user);
}

pub fn set_http_context(request: impl Into<Option<RequestContext>>) {
	client().set_http_context(request);
}

pub fn set_tags_context(tags: HashMap<String, String>) {
	client().set_tags_context(tags);
}

pub fn clear_context() {
	client().clear_context();
}

/// Closes the default client's queue. It cannot be reopened.
pub fn close() {
	client().close();
}

pub async fn wait() {
	client().wait().await;
}

pub fn wait_blocking() {
	client().wait_blocking();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_client_is_shared() {
		assert!(std::ptr::eq(client(), client()));
	}

	#[test]
	fn settings_round_trip_through_default_client() {
		set_include_paths(vec!["/srv/app".to_string()]);
		assert_eq!(include_paths(), vec!["/srv/app".to_string()]);
		assert!(set_sample_rate(2.0).is_err());
		assert!(set_dsn("").is_ok());
	}
}
