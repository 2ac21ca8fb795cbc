// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AuditSink, AuditSinkError};
use crate::envelope::AuditEnvelope;

/// Keeps every written batch in memory. Useful in tests and for embedding
/// the pipeline where another component reads the batches back.
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
	batches: Arc<Mutex<Vec<Vec<AuditEnvelope>>>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of all batches written so far, in write order.
	pub fn batches(&self) -> Vec<Vec<AuditEnvelope>> {
		self.batches.lock().clone()
	}

	/// All written envelopes, flattened in write order.
	pub fn envelopes(&self) -> Vec<AuditEnvelope> {
		self.batches.lock().iter().flatten().cloned().collect()
	}

	pub fn batch_count(&self) -> usize {
		self.batches.lock().len()
	}

	/// Remove and return everything written so far.
	pub fn take(&self) -> Vec<Vec<AuditEnvelope>> {
		std::mem::take(&mut *self.batches.lock())
	}
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
	fn name(&self) -> &str {
		"memory"
	}

	async fn write_batch(&self, batch: Vec<AuditEnvelope>) -> Result<(), AuditSinkError> {
		self.batches.lock().push(batch);
		Ok(())
	}
}
