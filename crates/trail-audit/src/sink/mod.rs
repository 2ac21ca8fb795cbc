// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::envelope::AuditEnvelope;
pub use crate::error::AuditSinkError;

/// Durable destination for batches of audit envelopes.
#[async_trait]
pub trait AuditSink: Send + Sync {
	/// Unique name for this sink (used in logs).
	fn name(&self) -> &str;

	/// Persist one batch, in order. An error fails the whole batch; the
	/// worker drops it and does not retry.
	async fn write_batch(&self, batch: Vec<AuditEnvelope>) -> Result<(), AuditSinkError>;

	/// Health check (optional, default: Ok).
	async fn health_check(&self) -> Result<(), AuditSinkError> {
		Ok(())
	}
}

pub mod memory;

#[cfg(feature = "sink-sqlite")]
pub mod sqlite;

#[cfg(feature = "sink-tracing")]
pub mod tracing;

#[cfg(feature = "sink-file")]
pub mod file;
