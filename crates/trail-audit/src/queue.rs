// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded multi-producer, single-consumer queue with drop-oldest overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::envelope::AuditEnvelope;
use crate::error::{AuditError, AuditResult};

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// FIFO of envelopes waiting for the batch worker.
///
/// When the queue is full, a push evicts the oldest envelope in the same
/// critical section that admits the new one. Pushing never waits.
pub struct AuditQueue {
	state: Mutex<QueueState>,
	capacity: usize,
	dropped: AtomicU64,
	notify: Notify,
}

struct QueueState {
	items: VecDeque<AuditEnvelope>,
	closed: bool,
}

impl AuditQueue {
	/// Create a queue holding at most `capacity` envelopes (minimum 1).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			state: Mutex::new(QueueState {
				items: VecDeque::with_capacity(capacity.min(1024)),
				closed: false,
			}),
			capacity,
			dropped: AtomicU64::new(0),
			notify: Notify::new(),
		}
	}

	pub fn with_default_capacity() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}

	/// Append an envelope, evicting the oldest one if the queue is full.
	///
	/// Fails only once the queue has been closed.
	pub fn push(&self, envelope: AuditEnvelope) -> AuditResult<()> {
		{
			let mut state = self.state.lock();
			if state.closed {
				return Err(AuditError::Shutdown);
			}
			if state.items.len() >= self.capacity {
				state.items.pop_front();
				self.dropped.fetch_add(1, Ordering::Relaxed);
			}
			state.items.push_back(envelope);
		}
		self.notify.notify_one();
		Ok(())
	}

	/// Move up to `max` envelopes, oldest first, into `batch`. Returns how many
	/// were moved.
	pub fn drain_into(&self, batch: &mut Vec<AuditEnvelope>, max: usize) -> usize {
		let mut state = self.state.lock();
		let n = max.min(state.items.len());
		batch.extend(state.items.drain(..n));
		n
	}

	/// Wait until a push (or close) happens.
	///
	/// A notification sent while nobody is waiting is kept, so a consumer
	/// that drains, finds nothing, then waits does not miss a push that
	/// landed in between.
	pub async fn notified(&self) {
		self.notify.notified().await;
	}

	/// Reject further pushes and wake the consumer. Queued envelopes stay
	/// available for draining.
	pub fn close(&self) {
		self.state.lock().closed = true;
		self.notify.notify_one();
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	pub fn len(&self) -> usize {
		self.state.lock().items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Envelopes evicted by overflow since the queue was created.
	pub fn dropped_count(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}

impl Default for AuditQueue {
	fn default() -> Self {
		Self::with_default_capacity()
	}
}
