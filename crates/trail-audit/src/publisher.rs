// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use tracing::trace;

use crate::envelope::Publishable;
use crate::error::AuditResult;
use crate::queue::AuditQueue;
use crate::scope::AuditScope;

/// Producer-facing handle onto the audit queue.
///
/// Cheap to clone; every clone feeds the same queue. Publishing never waits:
/// when the queue is full the oldest queued envelope is evicted instead.
#[derive(Clone)]
pub struct AuditPublisher {
	queue: Option<Arc<AuditQueue>>,
}

impl AuditPublisher {
	pub fn new(queue: Arc<AuditQueue>) -> Self {
		Self { queue: Some(queue) }
	}

	/// A publisher that accepts and discards everything. Used when auditing
	/// is turned off in configuration.
	pub fn disabled() -> Self {
		Self { queue: None }
	}

	pub fn is_enabled(&self) -> bool {
		self.queue.is_some()
	}

	/// Stamp, backfill from `scope`, and enqueue an event.
	///
	/// Returns [`AuditError::Shutdown`](crate::AuditError::Shutdown) once the
	/// pipeline has been shut down. A full queue is not an error.
	pub fn publish(&self, event: impl Into<Publishable>, scope: &AuditScope) -> AuditResult<()> {
		let Some(queue) = &self.queue else {
			return Ok(());
		};
		let envelope = event.into().into_envelope().with_scope_backfill(scope);
		trace!(
			id = %envelope.id(),
			event_type = %envelope.event_type(),
			"enqueueing audit envelope"
		);
		queue.push(envelope)
	}

	/// Publish with the empty default scope.
	pub fn publish_unscoped(&self, event: impl Into<Publishable>) -> AuditResult<()> {
		self.publish(event, &AuditScope::default())
	}

	/// Envelopes evicted by queue overflow so far.
	pub fn dropped_count(&self) -> u64 {
		self.queue.as_ref().map_or(0, |q| q.dropped_count())
	}

	pub fn is_closed(&self) -> bool {
		self.queue.as_ref().is_some_and(|q| q.is_closed())
	}
}

impl std::fmt::Debug for AuditPublisher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.queue {
			Some(queue) => f
				.debug_struct("AuditPublisher")
				.field("queued", &queue.len())
				.field("capacity", &queue.capacity())
				.field("dropped", &queue.dropped_count())
				.finish(),
			None => f.write_str("AuditPublisher(disabled)"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::envelope::{AuditEnvelope, AuditEvent, AuditEventType};
	use crate::error::AuditError;

	fn drain(queue: &AuditQueue) -> Vec<AuditEnvelope> {
		let mut batch = Vec::new();
		queue.drain_into(&mut batch, usize::MAX);
		batch
	}

	#[test]
	fn publish_backfills_from_scope() {
		let queue = Arc::new(AuditQueue::new(10));
		let publisher = AuditPublisher::new(Arc::clone(&queue));
		let scope = AuditScope::default()
			.with_tenant("t-1")
			.with_user("u-1", "alice")
			.with_request_id("req-9");

		publisher
			.publish(AuditEvent::builder(AuditEventType::Activity).build(), &scope)
			.unwrap();

		let envelope = drain(&queue).remove(0);
		assert_eq!(envelope.tenant_id(), Some("t-1"));
		assert_eq!(envelope.user_name(), Some("alice"));
		assert_eq!(envelope.request_id(), Some("req-9"));
	}

	#[test]
	fn publish_never_overwrites_tenant() {
		let queue = Arc::new(AuditQueue::new(10));
		let publisher = AuditPublisher::new(Arc::clone(&queue));
		let scope = AuditScope::default().with_tenant("ambient");

		publisher
			.publish(
				AuditEvent::builder(AuditEventType::Security)
					.tenant_id("explicit")
					.build(),
				&scope,
			)
			.unwrap();

		assert_eq!(drain(&queue)[0].tenant_id(), Some("explicit"));
	}

	#[test]
	fn prebuilt_envelope_keeps_its_id() {
		let queue = Arc::new(AuditQueue::new(10));
		let publisher = AuditPublisher::new(Arc::clone(&queue));
		let envelope =
			AuditEnvelope::from_event(AuditEvent::builder(AuditEventType::Activity).build());
		let id = envelope.id();

		publisher.publish_unscoped(envelope).unwrap();

		assert_eq!(drain(&queue)[0].id(), id);
	}

	#[test]
	fn full_queue_does_not_error() {
		let queue = Arc::new(AuditQueue::new(2));
		let publisher = AuditPublisher::new(Arc::clone(&queue));

		for _ in 0..5 {
			publisher
				.publish_unscoped(AuditEvent::builder(AuditEventType::Activity).build())
				.unwrap();
		}

		assert_eq!(queue.len(), 2);
		assert_eq!(publisher.dropped_count(), 3);
	}

	#[test]
	fn publish_after_close_reports_shutdown() {
		let queue = Arc::new(AuditQueue::new(2));
		let publisher = AuditPublisher::new(Arc::clone(&queue));
		queue.close();

		let result = publisher.publish_unscoped(AuditEvent::builder(AuditEventType::Activity).build());
		assert!(matches!(result, Err(AuditError::Shutdown)));
		assert!(publisher.is_closed());
	}

	#[test]
	fn disabled_publisher_discards() {
		let publisher = AuditPublisher::disabled();
		assert!(!publisher.is_enabled());
		publisher
			.publish_unscoped(AuditEvent::builder(AuditEventType::Activity).build())
			.unwrap();
		assert_eq!(publisher.dropped_count(), 0);
	}

	#[test]
	fn clones_share_one_queue() {
		let queue = Arc::new(AuditQueue::new(10));
		let a = AuditPublisher::new(Arc::clone(&queue));
		let b = a.clone();

		a.publish_unscoped(AuditEvent::builder(AuditEventType::Activity).build())
			.unwrap();
		b.publish_unscoped(AuditEvent::builder(AuditEventType::Activity).build())
			.unwrap();

		assert_eq!(queue.len(), 2);
	}
}
