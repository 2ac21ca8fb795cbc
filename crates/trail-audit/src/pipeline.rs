// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AuditResult;
use crate::masking::Masker;
use crate::publisher::AuditPublisher;
use crate::queue::AuditQueue;
use crate::sink::AuditSink;
use crate::worker::{BatchWorker, WorkerConfig, WorkerStats};
use trail_audit_config::AuditPipelineConfig;

/// Point-in-time pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
	/// Envelopes currently waiting in the queue.
	pub queued: usize,
	/// Envelopes evicted by queue overflow.
	pub dropped: u64,
	pub flushed_batches: u64,
	pub flushed_events: u64,
	pub failed_batches: u64,
}

/// A running audit pipeline: the queue, its publisher, and the batch worker
/// task.
pub struct AuditPipeline {
	queue: Option<Arc<AuditQueue>>,
	publisher: AuditPublisher,
	masker: Masker,
	stats: Arc<WorkerStats>,
	shutdown: CancellationToken,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuditPipeline {
	/// Build the queue and spawn the batch worker on the current tokio
	/// runtime. With `enabled = false` nothing is spawned and the publisher
	/// discards every event.
	pub fn start(config: &AuditPipelineConfig, sink: Arc<dyn AuditSink>) -> Self {
		let masker = Masker::with_keywords(&config.extra_sensitive_keywords);
		let shutdown = CancellationToken::new();

		if !config.enabled {
			info!("audit pipeline disabled by configuration");
			return Self {
				queue: None,
				publisher: AuditPublisher::disabled(),
				masker,
				stats: Arc::new(WorkerStats::default()),
				shutdown,
				handle: Mutex::new(None),
			};
		}

		let queue = Arc::new(AuditQueue::new(config.queue_capacity));
		let worker = BatchWorker::new(Arc::clone(&queue), sink, WorkerConfig::from(config));
		let stats = worker.stats();
		let handle = tokio::spawn(worker.run(shutdown.clone()));

		info!(
			queue_capacity = queue.capacity(),
			batch_size = config.batch_size,
			"audit pipeline started"
		);

		Self {
			publisher: AuditPublisher::new(Arc::clone(&queue)),
			queue: Some(queue),
			masker,
			stats,
			shutdown,
			handle: Mutex::new(Some(handle)),
		}
	}

	/// Load the `[audit]` section from a TOML file (with environment
	/// overrides) and start the pipeline with it.
	pub fn from_config_file(
		path: impl Into<PathBuf>,
		sink: Arc<dyn AuditSink>,
	) -> AuditResult<Self> {
		let config = trail_audit_config::load_config_with_file(path)?;
		Ok(Self::start(&config.audit, sink))
	}

	pub fn publisher(&self) -> AuditPublisher {
		self.publisher.clone()
	}

	/// Masker carrying the configured extra sensitive keywords.
	pub fn masker(&self) -> &Masker {
		&self.masker
	}

	pub fn stats(&self) -> PipelineStats {
		let (queued, dropped) = match &self.queue {
			Some(queue) => (queue.len(), queue.dropped_count()),
			None => (0, 0),
		};
		PipelineStats {
			queued,
			dropped,
			flushed_batches: self.stats.flushed_batches(),
			flushed_events: self.stats.flushed_events(),
			failed_batches: self.stats.failed_batches(),
		}
	}

	/// Stop accepting events, flush what is queued, and wait for the worker
	/// to exit. Calling it again is a no-op.
	pub async fn shutdown(&self) {
		if let Some(queue) = &self.queue {
			queue.close();
		}
		self.shutdown.cancel();

		let handle = self.handle.lock().take();
		if let Some(handle) = handle {
			if let Err(e) = handle.await {
				warn!(error = %e, "audit batch worker did not exit cleanly");
			}
		}
	}
}

impl Drop for AuditPipeline {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}
