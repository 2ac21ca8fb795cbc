// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tracing::Level;

use super::{AuditSink, AuditSinkError};
use crate::envelope::{AuditEnvelope, AuditSeverity};

/// Emits each envelope as a `tracing` event on the `trail_audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
	pub fn new() -> Self {
		Self
	}
}

pub fn severity_to_level(severity: AuditSeverity) -> Level {
	match severity {
		AuditSeverity::Information => Level::INFO,
		AuditSeverity::Warning => Level::WARN,
		AuditSeverity::Error | AuditSeverity::Critical => Level::ERROR,
	}
}

fn emit(envelope: &AuditEnvelope) {
	let id = envelope.id().to_string();
	let event_type = envelope.event_type().to_string();
	let severity = envelope.severity().to_string();
	let occurred_at = envelope.occurred_at().to_rfc3339();
	let source = envelope.source();
	let tenant_id = envelope.tenant_id();
	let user_id = envelope.user_id();
	let trace_id = envelope.trace_id();
	let correlation_id = envelope.correlation_id();
	let request_id = envelope.request_id();
	let tags = envelope.tags().bits();
	let payload = if envelope.payload().is_null() {
		None
	} else {
		Some(envelope.payload().to_string())
	};

	macro_rules! audit_event {
		($macro:ident) => {
			tracing::$macro!(
				target: "trail_audit",
				id,
				event_type,
				severity,
				occurred_at,
				source,
				tenant_id,
				user_id,
				trace_id,
				correlation_id,
				request_id,
				tags,
				payload,
				"audit event"
			)
		};
	}

	match severity_to_level(envelope.severity()) {
		Level::WARN => audit_event!(warn),
		Level::ERROR => audit_event!(error),
		_ => audit_event!(info),
	}
}

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn write_batch(&self, batch: Vec<AuditEnvelope>) -> Result<(), AuditSinkError> {
		for envelope in &batch {
			emit(envelope);
		}
		Ok(())
	}
}
