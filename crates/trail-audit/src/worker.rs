// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The single consumer that drains the audit queue into sink batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::envelope::AuditEnvelope;
use crate::error::AuditError;
use crate::queue::AuditQueue;
use crate::sink::AuditSink;
use trail_audit_config::AuditPipelineConfig;

/// Batching and timing settings for [`BatchWorker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
	/// Flush as soon as this many envelopes are batched.
	pub batch_size: usize,
	/// Flush a partial batch after this long without reaching `batch_size`.
	pub flush_interval: Duration,
	/// Pause after a failed sink write.
	pub failure_backoff: Duration,
	/// Upper bound on the final drain at shutdown.
	pub shutdown_flush_timeout: Duration,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self::from(&AuditPipelineConfig::default())
	}
}

impl From<&AuditPipelineConfig> for WorkerConfig {
	fn from(config: &AuditPipelineConfig) -> Self {
		Self {
			batch_size: config.batch_size.max(1),
			flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
			failure_backoff: Duration::from_millis(config.failure_backoff_ms),
			shutdown_flush_timeout: Duration::from_millis(config.shutdown_flush_timeout_ms),
		}
	}
}

/// Counters updated by the worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
	flushed_batches: AtomicU64,
	flushed_events: AtomicU64,
	failed_batches: AtomicU64,
}

impl WorkerStats {
	pub fn flushed_batches(&self) -> u64 {
		self.flushed_batches.load(Ordering::Relaxed)
	}

	pub fn flushed_events(&self) -> u64 {
		self.flushed_events.load(Ordering::Relaxed)
	}

	pub fn failed_batches(&self) -> u64 {
		self.failed_batches.load(Ordering::Relaxed)
	}
}

pub struct BatchWorker {
	queue: Arc<AuditQueue>,
	sink: Arc<dyn AuditSink>,
	config: WorkerConfig,
	stats: Arc<WorkerStats>,
}

impl BatchWorker {
	pub fn new(queue: Arc<AuditQueue>, sink: Arc<dyn AuditSink>, config: WorkerConfig) -> Self {
		Self {
			queue,
			sink,
			config,
			stats: Arc::new(WorkerStats::default()),
		}
	}

	pub fn stats(&self) -> Arc<WorkerStats> {
		Arc::clone(&self.stats)
	}

	/// Run until `shutdown` is cancelled, then close the queue and drain what
	/// is left.
	///
	/// A batch is flushed when it reaches `batch_size` or when
	/// `flush_interval` passes, whichever comes first. A failed write drops
	/// the batch and pauses for `failure_backoff`.
	#[instrument(skip_all, fields(sink = %self.sink.name(), batch_size = self.config.batch_size))]
	pub async fn run(self, shutdown: CancellationToken) {
		if let Err(e) = self.sink.health_check().await {
			warn!(error = %e, "audit sink health check failed at startup");
		}

		info!(
			flush_interval_ms = self.config.flush_interval.as_millis() as u64,
			"audit batch worker started"
		);

		let batch_size = self.config.batch_size;
		let period = self.config.flush_interval;
		let mut timer = interval_at(Instant::now() + period, period);
		timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut batch: Vec<AuditEnvelope> = Vec::with_capacity(batch_size);

		loop {
			let room = batch_size - batch.len();
			self.queue.drain_into(&mut batch, room);

			if batch.len() >= batch_size {
				let ok = self.flush(&mut batch).await;
				timer.reset();
				if !ok && self.back_off(&shutdown).await {
					break;
				}
				continue;
			}

			tokio::select! {
				biased;

				_ = shutdown.cancelled() => break,

				_ = timer.tick() => {
					if !batch.is_empty() {
						let ok = self.flush(&mut batch).await;
						timer.reset();
						if !ok && self.back_off(&shutdown).await {
							break;
						}
					}
				}

				_ = self.queue.notified() => {}
			}
		}

		// Late producers get `Shutdown` instead of extending the final drain.
		self.queue.close();
		debug!(pending = batch.len() + self.queue.len(), "audit batch worker draining");
		self.final_flush(batch).await;
		info!(
			flushed_batches = self.stats.flushed_batches(),
			failed_batches = self.stats.failed_batches(),
			dropped = self.queue.dropped_count(),
			"audit batch worker stopped"
		);
	}

	/// Write `batch` to the sink and clear it. Returns false when the sink
	/// failed; the batch is discarded either way.
	async fn flush(&self, batch: &mut Vec<AuditEnvelope>) -> bool {
		let events = std::mem::replace(batch, Vec::with_capacity(self.config.batch_size));
		let count = events.len();

		match self.sink.write_batch(events).await {
			Ok(()) => {
				self.stats.flushed_batches.fetch_add(1, Ordering::Relaxed);
				self.stats
					.flushed_events
					.fetch_add(count as u64, Ordering::Relaxed);
				debug!(count, "flushed audit batch");
				true
			}
			Err(source) => {
				self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
				let e = AuditError::Sink {
					sink: self.sink.name().to_string(),
					source,
				};
				warn!(count, error = %e, "audit sink write failed, batch dropped");
				false
			}
		}
	}

	/// Sleep for the failure backoff. Returns true if shutdown was requested
	/// meanwhile.
	async fn back_off(&self, shutdown: &CancellationToken) -> bool {
		tokio::select! {
			biased;
			_ = shutdown.cancelled() => true,
			_ = tokio::time::sleep(self.config.failure_backoff) => false,
		}
	}

	async fn final_flush(&self, mut batch: Vec<AuditEnvelope>) {
		let drain = async {
			loop {
				let room = self.config.batch_size.saturating_sub(batch.len());
				self.queue.drain_into(&mut batch, room);
				if batch.is_empty() {
					break;
				}
				self.flush(&mut batch).await;
			}
		};

		if tokio::time::timeout(self.config.shutdown_flush_timeout, drain)
			.await
			.is_err()
		{
			warn!(
				remaining = self.queue.len(),
				timeout_ms = self.config.shutdown_flush_timeout.as_millis() as u64,
				"audit final flush timed out"
			);
		}
	}
}
