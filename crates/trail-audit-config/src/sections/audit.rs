// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit pipeline configuration section: queue, batching, and masking.

use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_CAPACITY: usize = 50_000;
const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_FAILURE_BACKOFF_MS: u64 = 250;
const DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditPipelineConfigLayer {
	pub enabled: Option<bool>,
	pub queue_capacity: Option<usize>,
	pub batch_size: Option<usize>,
	pub flush_interval_ms: Option<u64>,
	pub failure_backoff_ms: Option<u64>,
	pub shutdown_flush_timeout_ms: Option<u64>,
	pub extra_sensitive_keywords: Option<Vec<String>>,
}

impl AuditPipelineConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.batch_size.is_some() {
			self.batch_size = other.batch_size;
		}
		if other.flush_interval_ms.is_some() {
			self.flush_interval_ms = other.flush_interval_ms;
		}
		if other.failure_backoff_ms.is_some() {
			self.failure_backoff_ms = other.failure_backoff_ms;
		}
		if other.shutdown_flush_timeout_ms.is_some() {
			self.shutdown_flush_timeout_ms = other.shutdown_flush_timeout_ms;
		}
		if other.extra_sensitive_keywords.is_some() {
			self.extra_sensitive_keywords = other.extra_sensitive_keywords;
		}
	}

	pub fn finalize(self) -> AuditPipelineConfig {
		AuditPipelineConfig {
			enabled: self.enabled.unwrap_or(true),
			queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
			batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
			flush_interval_ms: self.flush_interval_ms.unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
			failure_backoff_ms: self
				.failure_backoff_ms
				.unwrap_or(DEFAULT_FAILURE_BACKOFF_MS),
			shutdown_flush_timeout_ms: self
				.shutdown_flush_timeout_ms
				.unwrap_or(DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_MS),
			extra_sensitive_keywords: self
				.extra_sensitive_keywords
				.unwrap_or_default()
				.into_iter()
				.map(|k| k.trim().to_ascii_lowercase())
				.filter(|k| !k.is_empty())
				.collect(),
		}
	}
}

/// Resolved queue and batching settings for the audit pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditPipelineConfig {
	pub enabled: bool,
	/// Maximum buffered envelopes before the oldest is evicted.
	pub queue_capacity: usize,
	/// Envelopes per sink write.
	pub batch_size: usize,
	pub flush_interval_ms: u64,
	/// Pause after a failed sink write before draining resumes.
	pub failure_backoff_ms: u64,
	pub shutdown_flush_timeout_ms: u64,
	/// Lower-cased keywords masked in addition to the built-in set.
	pub extra_sensitive_keywords: Vec<String>,
}

impl Default for AuditPipelineConfig {
	fn default() -> Self {
		AuditPipelineConfigLayer::default().finalize()
	}
}
