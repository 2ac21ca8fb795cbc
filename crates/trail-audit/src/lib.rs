// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Non-blocking audit event pipeline.
//!
//! Producers build [`AuditEvent`]s and hand them to an [`AuditPublisher`],
//! which stamps them into immutable [`AuditEnvelope`]s and pushes them onto a
//! bounded drop-oldest [`AuditQueue`]. A single [`BatchWorker`] drains the
//! queue into batches and writes them to an [`AuditSink`].
//!
//! ```ignore
//! let pipeline = AuditPipeline::start(&config.audit, Arc::new(TracingAuditSink::new()));
//! pipeline.publisher().publish(event, &scope)?;
//! pipeline.shutdown().await;
//! ```

pub mod diff;
pub mod envelope;
pub mod error;
pub mod masking;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod scope;
pub mod severity;
pub mod sink;
pub mod worker;

pub use diff::{
	build_diffs, DataType, DiffOperation, EntityDiff, EntryState, PropertyChange, TrackedEntry,
	TrackedProperty,
};
pub use envelope::{
	AuditEnvelope, AuditEvent, AuditEventBuilder, AuditEventType, AuditSeverity, AuditTags,
	ParseSeverityError, Publishable,
};
pub use error::{AuditError, AuditResult, AuditSinkError};
pub use masking::{mask, mask_in_place, mask_json_bytes, Masker, REDACTION_MARKER};
pub use pipeline::{AuditPipeline, PipelineStats};
pub use publisher::AuditPublisher;
pub use queue::AuditQueue;
pub use scope::AuditScope;
pub use severity::{classify, classify_panic, panic_message, Cancelled, Forbidden};
pub use sink::memory::MemoryAuditSink;
pub use sink::AuditSink;
pub use worker::{BatchWorker, WorkerConfig, WorkerStats};

pub use trail_audit_config::AuditPipelineConfig;

#[cfg(feature = "sink-sqlite")]
pub use sink::sqlite::SqliteAuditSink;

#[cfg(feature = "sink-tracing")]
pub use sink::tracing::TracingAuditSink;

#[cfg(feature = "sink-file")]
pub use sink::file::FileAuditSink;
