// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded delivery queue and the background worker that drains it.
//!
//! Producers never wait on the queue: when it is full the event is dropped
//! and its completion is resolved with [`SendError::PacketDropped`]. A single
//! worker sends queued events one at a time, in arrival order.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use futures::FutureExt;
use loom_sentry_core::Event;
use parking_lot::{Condvar, Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::error::SendError;
use crate::panic_hook::panic_message;
use crate::settings::Settings;
use crate::transport::Transport;

/// Default number of events buffered before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

const WORKER_THREAD_NAME: &str = "loom-sentry-worker";

/// Outcome of delivering one event.
pub type SendResult = std::result::Result<(), SendError>;

/// One event on its way to the worker, with the slot its outcome goes to.
#[derive(Debug)]
pub(crate) struct Delivery {
	pub event: Event,
	pub completion: oneshot::Sender<SendResult>,
}

/// Receives the delivery outcome of one captured event.
#[derive(Debug)]
pub struct Completion {
	rx: Option<oneshot::Receiver<SendResult>>,
}

impl Completion {
	pub(crate) fn pending() -> (oneshot::Sender<SendResult>, Self) {
		let (tx, rx) = oneshot::channel();
		(tx, Self { rx: Some(rx) })
	}

	/// A completion that already holds `result`.
	pub fn resolved(result: SendResult) -> Self {
		let (tx, completion) = Self::pending();
		let _ = tx.send(result);
		completion
	}

	/// A completion that will never receive a value.
	pub fn empty() -> Self {
		Self { rx: None }
	}

	/// Waits for the outcome. Returns `None` if no outcome will ever arrive,
	/// e.g. because the capture was sampled out.
	pub async fn wait(self) -> Option<SendResult> {
		self.rx?.await.ok()
	}

	/// Blocking form of [`Completion::wait`].
	///
	/// # Panics
	///
	/// Panics when called from within an asynchronous execution context.
	pub fn blocking_wait(self) -> Option<SendResult> {
		self.rx?.blocking_recv().ok()
	}

	/// Takes the outcome if it has arrived. Returns `None` while the event is
	/// still pending and once the completion is exhausted.
	pub fn try_result(&mut self) -> Option<SendResult> {
		let rx = self.rx.as_mut()?;
		match rx.try_recv() {
			Ok(result) => {
				self.rx = None;
				Some(result)
			}
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Closed) => {
				self.rx = None;
				None
			}
		}
	}
}

/// Counts accepted events that have not been sent or failed yet.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
	count: Mutex<usize>,
	idle: Condvar,
	notify: Notify,
}

impl InFlight {
	pub fn begin(&self) {
		*self.count.lock() += 1;
	}

	pub fn finish(&self) {
		let mut count = self.count.lock();
		*count = count.saturating_sub(1);
		if *count == 0 {
			self.idle.notify_all();
			self.notify.notify_waiters();
		}
	}

	pub fn count(&self) -> usize {
		*self.count.lock()
	}

	pub async fn wait(&self) {
		loop {
			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.count() == 0 {
				return;
			}
			notified.await;
		}
	}

	pub fn wait_blocking(&self) {
		let mut count = self.count.lock();
		while *count > 0 {
			self.idle.wait(&mut count);
		}
	}
}

/// Why the queue refused a delivery.
#[derive(Debug)]
pub(crate) enum Rejected {
	Full(Delivery),
	Closed(Delivery),
}

/// The worker's view of the client.
pub(crate) struct Worker {
	pub settings: Arc<RwLock<Settings>>,
	pub transport: Arc<dyn Transport>,
	pub in_flight: Arc<InFlight>,
}

impl Worker {
	/// Drives the worker on the current thread until the queue closes.
	fn run_blocking(self, receiver: mpsc::Receiver<Delivery>) {
		let runtime = match tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
		{
			Ok(runtime) => runtime,
			Err(e) => {
				error!(error = %e, "Failed to start delivery worker runtime");
				self.abandon(receiver);
				return;
			}
		};
		runtime.block_on(self.run(receiver));
	}

	async fn run(&self, mut receiver: mpsc::Receiver<Delivery>) {
		debug!("Delivery worker started");

		while let Some(Delivery { event, completion }) = receiver.recv().await {
			let (url, auth_header) = {
				let settings = self.settings.read();
				(settings.url.clone(), settings.auth_header.clone())
			};

			let result = AssertUnwindSafe(self.transport.send(&url, &auth_header, &event))
				.catch_unwind()
				.await
				.unwrap_or_else(|payload| {
					Err(SendError::TransportPanicked(panic_message(payload.as_ref())))
				});
			match &result {
				Ok(()) => debug!(event_id = %event.event_id, "Event delivered"),
				Err(e) => warn!(event_id = %event.event_id, error = %e, "Failed to deliver event"),
			}

			let _ = completion.send(result);
			self.in_flight.finish();
		}

		debug!("Delivery worker stopped");
	}

	/// Resolves everything already queued as dropped.
	fn abandon(&self, mut receiver: mpsc::Receiver<Delivery>) {
		receiver.close();
		while let Ok(delivery) = receiver.try_recv() {
			let _ = delivery.completion.send(Err(SendError::PacketDropped));
			self.in_flight.finish();
		}
	}
}

/// The bounded channel between capturing threads and the worker.
pub(crate) struct DeliveryQueue {
	sender: RwLock<Option<mpsc::Sender<Delivery>>>,
	receiver: Mutex<Option<mpsc::Receiver<Delivery>>>,
	start: Once,
}

impl DeliveryQueue {
	pub fn new(capacity: usize) -> Self {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		Self {
			sender: RwLock::new(Some(tx)),
			receiver: Mutex::new(Some(rx)),
			start: Once::new(),
		}
	}

	/// Spawns the worker the first time it is called; later calls do nothing.
	pub fn start_worker(&self, worker: impl FnOnce() -> Worker) {
		self.start.call_once(|| {
			let Some(receiver) = self.receiver.lock().take() else {
				return;
			};
			let worker = worker();
			let spawned = std::thread::Builder::new()
				.name(WORKER_THREAD_NAME.to_string())
				.spawn(move || worker.run_blocking(receiver));
			if let Err(e) = spawned {
				error!(error = %e, "Failed to spawn delivery worker thread");
			}
		});
	}

	/// Queues a delivery without waiting. Hands the delivery back when the
	/// queue is full or closed.
	pub fn try_enqueue(&self, delivery: Delivery) -> std::result::Result<(), Rejected> {
		let sender = self.sender.read();
		let Some(tx) = sender.as_ref() else {
			return Err(Rejected::Closed(delivery));
		};
		tx.try_send(delivery).map_err(|e| match e {
			TrySendError::Full(delivery) => Rejected::Full(delivery),
			TrySendError::Closed(delivery) => Rejected::Closed(delivery),
		})
	}

	/// Stops accepting deliveries. Already queued ones are still sent.
	/// Returns false if the queue was already closed.
	pub fn close(&self) -> bool {
		let closed = self.sender.write().take().is_some();
		if closed {
			info!("Delivery queue closed");
		}
		closed
	}

	pub fn is_closed(&self) -> bool {
		self.sender.read().is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::time::Duration;

	struct OkTransport;

	#[async_trait::async_trait]
	impl Transport for OkTransport {
		async fn send(&self, _url: &str, _auth: &str, _event: &Event) -> SendResult {
			Ok(())
		}
	}

	/// Panics on the first send, succeeds afterwards.
	#[derive(Default)]
	struct PanicOnceTransport {
		panicked: std::sync::atomic::AtomicBool,
	}

	#[async_trait::async_trait]
	impl Transport for PanicOnceTransport {
		async fn send(&self, _url: &str, _auth: &str, _event: &Event) -> SendResult {
			if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
				panic!("transport exploded");
			}
			Ok(())
		}
	}

	fn worker(in_flight: Arc<InFlight>) -> Worker {
		Worker {
			settings: Arc::new(RwLock::new(Settings::new(HashMap::new()))),
			transport: Arc::new(OkTransport),
			in_flight,
		}
	}

	fn delivery() -> (Delivery, Completion) {
		let (tx, completion) = Completion::pending();
		(
			Delivery {
				event: Event::new("queued"),
				completion: tx,
			},
			completion,
		)
	}

	#[tokio::test]
	async fn resolved_completion_yields_value() {
		let completion = Completion::resolved(Err(SendError::PacketDropped));
		assert!(matches!(
			completion.wait().await,
			Some(Err(SendError::PacketDropped))
		));
	}

	#[tokio::test]
	async fn empty_completion_yields_nothing() {
		assert!(Completion::empty().wait().await.is_none());
		assert!(Completion::empty().try_result().is_none());
	}

	#[test]
	fn try_result_is_none_while_pending() {
		let (tx, mut completion) = Completion::pending();
		assert!(completion.try_result().is_none());
		tx.send(Ok(())).unwrap();
		assert!(matches!(completion.try_result(), Some(Ok(()))));
		assert!(completion.try_result().is_none());
	}

	#[test]
	fn full_queue_hands_delivery_back() {
		let queue = DeliveryQueue::new(1);
		assert!(queue.try_enqueue(delivery().0).is_ok());
		assert!(matches!(
			queue.try_enqueue(delivery().0),
			Err(Rejected::Full(_))
		));
	}

	#[test]
	fn closed_queue_rejects() {
		let queue = DeliveryQueue::new(4);
		assert!(queue.close());
		assert!(!queue.close());
		assert!(queue.is_closed());
		assert!(matches!(
			queue.try_enqueue(delivery().0),
			Err(Rejected::Closed(_))
		));
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn worker_drains_queue_after_close() {
		let in_flight = Arc::new(InFlight::default());
		let queue = DeliveryQueue::new(8);

		let mut completions = Vec::new();
		for _ in 0..3 {
			let (delivery, completion) = delivery();
			in_flight.begin();
			queue.try_enqueue(delivery).unwrap();
			completions.push(completion);
		}
		queue.close();
		queue.start_worker(|| worker(in_flight.clone()));

		for completion in completions {
			assert!(matches!(completion.wait().await, Some(Ok(()))));
		}
		tokio::time::timeout(Duration::from_secs(5), in_flight.wait())
			.await
			.unwrap();
		assert_eq!(in_flight.count(), 0);
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn worker_survives_panicking_transport() {
		let in_flight = Arc::new(InFlight::default());
		let queue = DeliveryQueue::new(8);
		queue.start_worker(|| Worker {
			transport: Arc::new(PanicOnceTransport::default()),
			..worker(in_flight.clone())
		});

		let mut completions = Vec::new();
		for _ in 0..2 {
			let (delivery, completion) = delivery();
			in_flight.begin();
			queue.try_enqueue(delivery).unwrap();
			completions.push(completion);
		}

		let mut completions = completions.into_iter();
		match completions.next().unwrap().wait().await {
			Some(Err(SendError::TransportPanicked(message))) => {
				assert_eq!(message, "transport exploded");
			}
			other => panic!("expected transport panic, got {other:?}"),
		}
		assert!(matches!(
			completions.next().unwrap().wait().await,
			Some(Ok(()))
		));
		tokio::time::timeout(Duration::from_secs(5), in_flight.wait())
			.await
			.unwrap();
		assert_eq!(in_flight.count(), 0);
	}

	#[test]
	fn worker_starts_once() {
		let in_flight = Arc::new(InFlight::default());
		let queue = DeliveryQueue::new(1);
		let mut built = 0;
		for _ in 0..3 {
			queue.start_worker(|| {
				built += 1;
				worker(in_flight.clone())
			});
		}
		assert_eq!(built, 1);
	}

	#[test]
	fn in_flight_wait_blocking_returns_when_idle() {
		let in_flight = Arc::new(InFlight::default());
		in_flight.begin();
		in_flight.begin();

		let finisher = {
			let in_flight = in_flight.clone();
			std::thread::spawn(move || {
				std::thread::sleep(Duration::from_millis(20));
				in_flight.finish();
				in_flight.finish();
			})
		};
		in_flight.wait_blocking();
		assert_eq!(in_flight.count(), 0);
		finisher.join().unwrap();
	}

	#[test]
	fn abandon_drops_queued_deliveries() {
		let in_flight = Arc::new(InFlight::default());
		let (tx, rx) = mpsc::channel(4);
		let (delivery, completion) = delivery();
		in_flight.begin();
		tx.try_send(delivery).unwrap();

		worker(in_flight.clone()).abandon(rx);
		assert!(matches!(
			completion.blocking_wait(),
			Some(Err(SendError::PacketDropped))
		));
		assert_eq!(in_flight.count(), 0);
	}
}
