// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{AuditSink, AuditSinkError};
use crate::envelope::AuditEnvelope;

const CREATE_TABLE: &str = r#"
	CREATE TABLE IF NOT EXISTS audit_envelopes (
		id TEXT PRIMARY KEY NOT NULL,
		occurred_at TEXT NOT NULL,
		received_at TEXT NOT NULL,
		event_type TEXT NOT NULL,
		severity TEXT NOT NULL,
		tenant_id TEXT,
		user_id TEXT,
		user_name TEXT,
		trace_id TEXT,
		span_id TEXT,
		correlation_id TEXT,
		request_id TEXT,
		source TEXT NOT NULL,
		tags INTEGER NOT NULL,
		payload TEXT NOT NULL
	)
"#;

/// Writes each batch inside a single SQLite transaction.
pub struct SqliteAuditSink {
	pool: SqlitePool,
}

impl SqliteAuditSink {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create the `audit_envelopes` table if it does not exist.
	pub async fn ensure_schema(&self) -> Result<(), AuditSinkError> {
		sqlx::query(CREATE_TABLE)
			.execute(&self.pool)
			.await
			.map_err(classify_error)?;
		Ok(())
	}
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
	fn name(&self) -> &str {
		"sqlite"
	}

	async fn write_batch(&self, batch: Vec<AuditEnvelope>) -> Result<(), AuditSinkError> {
		let mut tx = self.pool.begin().await.map_err(classify_error)?;

		for envelope in &batch {
			let payload = serde_json::to_string(envelope.payload()).map_err(|e| {
				AuditSinkError::Permanent(format!("failed to serialize payload: {e}"))
			})?;

			sqlx::query(
				r#"
				INSERT INTO audit_envelopes (
					id, occurred_at, received_at, event_type, severity,
					tenant_id, user_id, user_name, trace_id, span_id,
					correlation_id, request_id, source, tags, payload
				) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
				"#,
			)
			.bind(envelope.id().to_string())
			.bind(envelope.occurred_at().to_rfc3339())
			.bind(envelope.received_at().to_rfc3339())
			.bind(envelope.event_type().to_string())
			.bind(envelope.severity().to_string())
			.bind(envelope.tenant_id())
			.bind(envelope.user_id())
			.bind(envelope.user_name())
			.bind(envelope.trace_id())
			.bind(envelope.span_id())
			.bind(envelope.correlation_id())
			.bind(envelope.request_id())
			.bind(envelope.source())
			.bind(i64::from(envelope.tags().bits()))
			.bind(payload)
			.execute(&mut *tx)
			.await
			.map_err(classify_error)?;
		}

		tx.commit().await.map_err(classify_error)?;
		Ok(())
	}

	async fn health_check(&self) -> Result<(), AuditSinkError> {
		sqlx::query("SELECT 1")
			.execute(&self.pool)
			.await
			.map_err(|e| AuditSinkError::Transient(format!("health check failed: {e}")))?;
		Ok(())
	}
}

fn classify_error(e: sqlx::Error) -> AuditSinkError {
	if is_transient_error(&e) {
		AuditSinkError::Transient(format!("database error: {e}"))
	} else {
		AuditSinkError::Permanent(format!("database error: {e}"))
	}
}

fn is_transient_error(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Io(_) => true,
		sqlx::Error::PoolTimedOut => true,
		sqlx::Error::PoolClosed => true,
		sqlx::Error::Database(db_err) => {
			let msg = db_err.message().to_lowercase();
			msg.contains("busy") || msg.contains("locked") || msg.contains("timeout")
		}
		_ => false,
	}
}
