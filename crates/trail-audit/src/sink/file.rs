// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AuditSink, AuditSinkError};
use crate::envelope::AuditEnvelope;

struct FileHandle {
	path: String,
	file: tokio::fs::File,
}

/// Appends envelopes as JSON lines.
///
/// The path may contain `%Y`, `%m`, `%d`, `%H`, `%M`, `%S`; the file is
/// reopened whenever the expanded path changes, which gives simple
/// time-based rotation.
pub struct FileAuditSink {
	path_template: String,
	handle: Mutex<Option<FileHandle>>,
}

impl FileAuditSink {
	pub fn new(path_template: impl Into<String>) -> Self {
		Self {
			path_template: path_template.into(),
			handle: Mutex::new(None),
		}
	}
}

#[async_trait]
impl AuditSink for FileAuditSink {
	fn name(&self) -> &str {
		"file"
	}

	async fn write_batch(&self, batch: Vec<AuditEnvelope>) -> Result<(), AuditSinkError> {
		let mut buf = String::new();
		for envelope in &batch {
			buf.push_str(&format_json_line(envelope)?);
		}

		let expanded_path = expand_path(&self.path_template, Utc::now());
		let mut guard = self.handle.lock().await;

		let needs_reopen = match &*guard {
			Some(handle) => handle.path != expanded_path,
			None => true,
		};

		if needs_reopen {
			debug!(path = %expanded_path, "opening audit file");
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&expanded_path)
				.await
				.map_err(|e| AuditSinkError::Transient(format!("failed to open file: {e}")))?;

			*guard = Some(FileHandle {
				path: expanded_path,
				file,
			});
		}

		let handle = guard
			.as_mut()
			.ok_or_else(|| AuditSinkError::Permanent("file handle not initialized".to_string()))?;

		handle
			.file
			.write_all(buf.as_bytes())
			.await
			.map_err(|e| AuditSinkError::Transient(format!("failed to write to file: {e}")))?;

		handle
			.file
			.flush()
			.await
			.map_err(|e| AuditSinkError::Transient(format!("failed to flush file: {e}")))?;

		Ok(())
	}
}

pub fn format_json_line(envelope: &AuditEnvelope) -> Result<String, AuditSinkError> {
	let json = serde_json::to_string(envelope)
		.map_err(|e| AuditSinkError::Permanent(format!("JSON serialization failed: {e}")))?;
	Ok(format!("{json}\n"))
}

pub fn expand_path(path: &str, now: DateTime<Utc>) -> String {
	path
		.replace("%Y", &format!("{:04}", now.year()))
		.replace("%m", &format!("{:02}", now.month()))
		.replace("%d", &format!("{:02}", now.day()))
		.replace("%H", &format!("{:02}", now.hour()))
		.replace("%M", &format!("{:02}", now.minute()))
		.replace("%S", &format!("{:02}", now.second()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::envelope::{AuditEvent, AuditEventType};
	use chrono::TimeZone;

	fn make_envelope(action: &str) -> AuditEnvelope {
		AuditEnvelope::from_event(
			AuditEvent::builder(AuditEventType::Security)
				.tenant_id("t-1")
				.payload(serde_json::json!({ "action": action }))
				.build(),
		)
	}

	#[test]
	fn format_json_line_is_single_line() {
		let line = format_json_line(&make_envelope("login\nagain")).unwrap();
		assert!(line.ends_with('\n'));
		assert!(!line.trim_end_matches('\n').contains('\n'));

		let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
		assert_eq!(json["event_type"], "security");
		assert_eq!(json["tenant_id"], "t-1");
	}

	#[test]
	fn expand_path_with_date_patterns() {
		let now = Utc.with_ymd_and_hms(2025, 1, 9, 4, 5, 6).unwrap();
		assert_eq!(
			expand_path("/var/log/audit-%Y-%m-%d-%H%M%S.log", now),
			"/var/log/audit-2025-01-09-040506.log"
		);
	}

	#[test]
	fn expand_path_without_patterns() {
		let now = Utc::now();
		assert_eq!(expand_path("/var/log/audit.log", now), "/var/log/audit.log");
	}

	#[tokio::test]
	async fn appends_batches_as_json_lines() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("audit.jsonl");
		let sink = FileAuditSink::new(path.to_string_lossy().into_owned());

		sink.write_batch(vec![make_envelope("a"), make_envelope("b")])
			.await
			.unwrap();
		sink.write_batch(vec![make_envelope("c")]).await.unwrap();

		let contents = tokio::fs::read_to_string(&path).await.unwrap();
		let actions: Vec<String> = contents
			.lines()
			.map(|l| {
				let v: serde_json::Value = serde_json::from_str(l).unwrap();
				v["payload"]["action"].as_str().unwrap().to_string()
			})
			.collect();
		assert_eq!(actions, vec!["a", "b", "c"]);
	}

	#[tokio::test]
	async fn unwritable_path_is_transient() {
		let sink = FileAuditSink::new("/nonexistent-dir/trail/audit.jsonl");
		let err = sink
			.write_batch(vec![make_envelope("a")])
			.await
			.unwrap_err();
		assert!(matches!(err, AuditSinkError::Transient(_)));
	}
}
