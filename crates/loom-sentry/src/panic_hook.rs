// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook used while a closure runs under `capture_panic`.
//!
//! Once the stack has unwound into `catch_unwind` the panic site is gone, so
//! the hook records the backtrace while it still can. It only does so on
//! threads that are currently inside a capture; every other panic goes to the
//! previously installed hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::UnwindSafe;
use std::sync::Once;

thread_local! {
	static CATCHING: Cell<usize> = const { Cell::new(0) };
	static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Where a caught panic happened.
#[derive(Debug, Clone)]
pub(crate) struct PanicSite {
	/// Alternate `Display` rendering of the backtrace taken in the hook.
	pub backtrace: String,
	pub location: Option<String>,
}

/// A panic caught by [`catch`].
pub(crate) struct Caught {
	pub payload: Box<dyn Any + Send>,
	pub site: Option<PanicSite>,
}

fn install() {
	INSTALL.call_once(|| {
		let default_hook = std::panic::take_hook();

		std::panic::set_hook(Box::new(move |info| {
			if CATCHING.with(Cell::get) == 0 {
				default_hook(info);
				return;
			}
			let site = PanicSite {
				backtrace: format!("{:#}", Backtrace::force_capture()),
				location: info
					.location()
					.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
			};
			LAST_PANIC.with(|last| *last.borrow_mut() = Some(site));
		}));
	});
}

/// Runs `f`, catching a panic together with the backtrace of its origin.
pub(crate) fn catch<F, R>(f: F) -> Result<R, Caught>
where
	F: FnOnce() -> R + UnwindSafe,
{
	install();
	LAST_PANIC.with(|last| last.borrow_mut().take());

	CATCHING.with(|depth| depth.set(depth.get() + 1));
	let result = std::panic::catch_unwind(f);
	CATCHING.with(|depth| depth.set(depth.get().saturating_sub(1)));

	result.map_err(|payload| Caught {
		payload,
		site: LAST_PANIC.with(|last| last.borrow_mut().take()),
	})
}

/// Extract the panic message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn returns_value_without_panic() {
		assert!(matches!(catch(|| 7), Ok(7)));
	}

	#[test]
	fn records_site_of_caught_panic() {
		let caught = match catch(|| panic!("kaboom {}", 1)) {
			Ok(()) => panic!("closure should have panicked"),
			Err(caught) => caught,
		};
		assert_eq!(panic_message(caught.payload.as_ref()), "kaboom 1");

		let site = caught.site.expect("hook should record the panic site");
		let location = site.location.unwrap();
		assert!(location.contains("panic_hook.rs"), "{location}");
		assert!(!site.backtrace.is_empty());
	}

	#[test]
	fn message_from_static_str_and_other_payloads() {
		assert_eq!(panic_message(&"static"), "static");
		assert_eq!(panic_message(&String::from("owned")), "owned");
		assert_eq!(panic_message(&42u8), "Box<dyn Any>");
	}
}
