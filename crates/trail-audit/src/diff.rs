// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity-change diffs built from change-tracking snapshots.
//!
//! The persistence layer hands over one [`TrackedEntry`] per tracked entity
//! at save time. [`build_diffs`] turns them into [`EntityDiff`]s, which become
//! `EntityChange` audit events through [`EntityDiff::into_event`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::{AuditEvent, AuditEventType, AuditSeverity, AuditTags};
use crate::masking::{self, REDACTION_MARKER};

const NO_KEY: &str = "<no-key>";
const SOFT_DELETE_PROPERTY: &str = "isdeleted";
const SENSITIVE_PROPERTY_KEYWORDS: &[&str] = &["password", "secret", "token"];

/// Tracking state of an entity at save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
	Added,
	Modified,
	Deleted,
	Unchanged,
	Detached,
}

/// Column data type as reported by the change tracker.
///
/// Every variant except [`DataType::Complex`] is a scalar and is eligible for
/// diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
	Bool,
	Integer,
	Decimal,
	Float,
	String,
	Enum,
	DateTime,
	Duration,
	Uuid,
	Bytes,
	/// Owned types, navigations, collections.
	Complex,
}

impl DataType {
	pub fn is_scalar(self) -> bool {
		!matches!(self, DataType::Complex)
	}
}

/// One property snapshot of a tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProperty {
	pub name: String,
	pub data_type: DataType,
	pub original: Value,
	pub current: Value,
	pub is_primary_key: bool,
	pub is_shadow: bool,
	pub is_concurrency_token: bool,
	pub is_indexer: bool,
	pub is_foreign_key: bool,
	pub is_nullable: bool,
}

impl TrackedProperty {
	/// A plain nullable scalar column; adjust flags with struct update syntax.
	pub fn scalar(
		name: impl Into<String>,
		data_type: DataType,
		original: Value,
		current: Value,
	) -> Self {
		Self {
			name: name.into(),
			data_type,
			original,
			current,
			is_primary_key: false,
			is_shadow: false,
			is_concurrency_token: false,
			is_indexer: false,
			is_foreign_key: false,
			is_nullable: true,
		}
	}

	/// A primary-key column whose value does not change.
	pub fn key(name: impl Into<String>, data_type: DataType, value: Value) -> Self {
		Self {
			is_primary_key: true,
			is_nullable: false,
			..Self::scalar(name, data_type, value.clone(), value)
		}
	}

	fn is_recorded(&self) -> bool {
		if self.is_primary_key || self.is_concurrency_token || self.is_indexer {
			return false;
		}
		if self.is_shadow {
			return false;
		}
		if self.is_foreign_key && !self.is_nullable {
			return false;
		}
		self.data_type.is_scalar()
	}

	fn is_soft_delete_flip(&self) -> bool {
		self.data_type == DataType::Bool
			&& self.name.eq_ignore_ascii_case(SOFT_DELETE_PROPERTY)
			&& self.original == Value::Bool(false)
			&& self.current == Value::Bool(true)
	}
}

/// A tracked entity as materialized by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntry {
	pub table: String,
	pub schema: Option<String>,
	pub entity_name: String,
	pub state: EntryState,
	pub properties: Vec<TrackedProperty>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOperation {
	Insert,
	Update,
	SoftDelete,
	Delete,
	None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
	pub name: String,
	pub data_type: DataType,
	pub old_value: Value,
	pub new_value: Value,
	/// Flags the change for masking; the values themselves are left as-is
	/// until the diff is turned into an event.
	pub is_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
	pub table: String,
	pub schema: Option<String>,
	pub entity_name: String,
	pub key: String,
	pub operation: DiffOperation,
	pub changes: Vec<PropertyChange>,
}

impl EntityDiff {
	/// Wrap the diff as an `EntityChange` event. Values of sensitive changes
	/// are replaced by the redaction marker and the remaining payload is run
	/// through the masking engine.
	pub fn into_event(self) -> AuditEvent {
		let mut masked_any = false;
		let changes: Vec<Value> = self
			.changes
			.into_iter()
			.map(|change| {
				let (old_value, new_value) = if change.is_sensitive {
					masked_any = true;
					(redacted_or_null(&change.old_value), redacted_or_null(&change.new_value))
				} else {
					(change.old_value, change.new_value)
				};
				json!({
					"name": change.name,
					"data_type": change.data_type,
					"old_value": old_value,
					"new_value": new_value,
					"is_sensitive": change.is_sensitive,
				})
			})
			.collect();

		let mut payload = json!({
			"table": self.table,
			"schema": self.schema,
			"entity_name": self.entity_name,
			"key": self.key,
			"operation": self.operation,
			"changes": changes,
		});
		masking::mask_in_place(&mut payload);

		let severity = match self.operation {
			DiffOperation::Delete => AuditSeverity::Warning,
			_ => AuditSeverity::Information,
		};
		let tags = if masked_any {
			AuditTags::PII_MASKED
		} else {
			AuditTags::NONE
		};

		AuditEvent::builder(AuditEventType::EntityChange)
			.severity(severity)
			.source("persistence")
			.tags(tags)
			.payload(payload)
			.build()
	}
}

fn redacted_or_null(value: &Value) -> Value {
	if value.is_null() {
		Value::Null
	} else {
		Value::String(REDACTION_MARKER.to_string())
	}
}

/// Build one diff per tracked entry that produced at least one change.
pub fn build_diffs(entries: &[TrackedEntry]) -> Vec<EntityDiff> {
	entries.iter().filter_map(build_diff).collect()
}

fn build_diff(entry: &TrackedEntry) -> Option<EntityDiff> {
	let operation = classify_operation(entry);
	let recorded = entry.properties.iter().filter(|p| p.is_recorded());

	let changes: Vec<PropertyChange> = match operation {
		DiffOperation::None => return None,
		DiffOperation::Insert => recorded
			.map(|p| change(p, Value::Null, p.current.clone()))
			.collect(),
		DiffOperation::Delete => recorded
			.map(|p| change(p, p.original.clone(), Value::Null))
			.collect(),
		DiffOperation::Update | DiffOperation::SoftDelete => recorded
			.filter(|p| p.original != p.current)
			.map(|p| change(p, p.original.clone(), p.current.clone()))
			.collect(),
	};

	if changes.is_empty() {
		return None;
	}

	Some(EntityDiff {
		table: entry.table.clone(),
		schema: entry.schema.clone(),
		entity_name: entry.entity_name.clone(),
		key: composite_key(&entry.properties),
		operation,
		changes,
	})
}

fn classify_operation(entry: &TrackedEntry) -> DiffOperation {
	match entry.state {
		EntryState::Added => DiffOperation::Insert,
		EntryState::Deleted => DiffOperation::Delete,
		EntryState::Modified => {
			if entry.properties.iter().any(TrackedProperty::is_soft_delete_flip) {
				DiffOperation::SoftDelete
			} else {
				DiffOperation::Update
			}
		}
		EntryState::Unchanged | EntryState::Detached => DiffOperation::None,
	}
}

fn change(property: &TrackedProperty, old_value: Value, new_value: Value) -> PropertyChange {
	PropertyChange {
		name: property.name.clone(),
		data_type: property.data_type,
		old_value,
		new_value,
		is_sensitive: is_sensitive_property(&property.name),
	}
}

fn is_sensitive_property(name: &str) -> bool {
	let name = name.to_ascii_lowercase();
	SENSITIVE_PROPERTY_KEYWORDS.iter().any(|k| name.contains(k))
}

fn composite_key(properties: &[TrackedProperty]) -> String {
	let parts: Vec<String> = properties
		.iter()
		.filter(|p| p.is_primary_key)
		.map(|p| format!("{}:{}", p.name, key_value(&p.current, &p.original)))
		.collect();

	if parts.is_empty() {
		NO_KEY.to_string()
	} else {
		parts.join("|")
	}
}

fn key_value(current: &Value, original: &Value) -> String {
	let value = if current.is_null() { original } else { current };
	match value {
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(state: EntryState, properties: Vec<TrackedProperty>) -> TrackedEntry {
		TrackedEntry {
			table: "customers".to_string(),
			schema: Some("crm".to_string()),
			entity_name: "Customer".to_string(),
			state,
			properties,
		}
	}

	#[test]
	fn added_entry_records_inserts() {
		let diffs = build_diffs(&[entry(
			EntryState::Added,
			vec![
				TrackedProperty::key("Id", DataType::Integer, json!(7)),
				TrackedProperty::scalar("Name", DataType::String, Value::Null, json!("x")),
			],
		)]);

		assert_eq!(diffs.len(), 1);
		let diff = &diffs[0];
		assert_eq!(diff.operation, DiffOperation::Insert);
		assert_eq!(diff.key, "Id:7");
		assert_eq!(diff.changes.len(), 1);
		assert_eq!(diff.changes[0].name, "Name");
		assert_eq!(diff.changes[0].old_value, Value::Null);
		assert_eq!(diff.changes[0].new_value, json!("x"));
	}

	#[test]
	fn modified_entry_records_only_changed_properties() {
		let diffs = build_diffs(&[entry(
			EntryState::Modified,
			vec![
				TrackedProperty::key("Id", DataType::Integer, json!(7)),
				TrackedProperty::scalar("Name", DataType::String, json!("x"), json!("x")),
				TrackedProperty::scalar("Status", DataType::Integer, json!(1), json!(2)),
			],
		)]);

		assert_eq!(diffs.len(), 1);
		assert_eq!(diffs[0].operation, DiffOperation::Update);
		assert_eq!(diffs[0].changes.len(), 1);
		let status = &diffs[0].changes[0];
		assert_eq!(status.name, "Status");
		assert_eq!(status.old_value, json!(1));
		assert_eq!(status.new_value, json!(2));
	}

	#[test]
	fn is_deleted_flip_is_soft_delete() {
		let diffs = build_diffs(&[entry(
			EntryState::Modified,
			vec![TrackedProperty::scalar(
				"isDeleted",
				DataType::Bool,
				json!(false),
				json!(true),
			)],
		)]);

		assert_eq!(diffs[0].operation, DiffOperation::SoftDelete);
	}

	#[test]
	fn is_deleted_clearing_is_update() {
		let diffs = build_diffs(&[entry(
			EntryState::Modified,
			vec![TrackedProperty::scalar(
				"IsDeleted",
				DataType::Bool,
				json!(true),
				json!(false),
			)],
		)]);

		assert_eq!(diffs[0].operation, DiffOperation::Update);
	}

	#[test]
	fn deleted_entry_records_originals() {
		let diffs = build_diffs(&[entry(
			EntryState::Deleted,
			vec![
				TrackedProperty::key("Id", DataType::Integer, json!(7)),
				TrackedProperty::scalar("Name", DataType::String, json!("x"), json!("x")),
			],
		)]);

		assert_eq!(diffs[0].operation, DiffOperation::Delete);
		assert_eq!(diffs[0].changes[0].old_value, json!("x"));
		assert_eq!(diffs[0].changes[0].new_value, Value::Null);
	}

	#[test]
	fn unchanged_and_detached_entries_are_omitted() {
		let props = vec![TrackedProperty::scalar(
			"Name",
			DataType::String,
			json!("a"),
			json!("b"),
		)];
		let diffs = build_diffs(&[
			entry(EntryState::Unchanged, props.clone()),
			entry(EntryState::Detached, props),
		]);
		assert!(diffs.is_empty());
	}

	#[test]
	fn modified_entry_without_changes_is_omitted() {
		let diffs = build_diffs(&[entry(
			EntryState::Modified,
			vec![TrackedProperty::scalar(
				"Name",
				DataType::String,
				json!("a"),
				json!("a"),
			)],
		)]);
		assert!(diffs.is_empty());
	}

	#[test]
	fn skips_ineligible_properties() {
		let diffs = build_diffs(&[entry(
			EntryState::Added,
			vec![
				TrackedProperty {
					is_shadow: true,
					..TrackedProperty::scalar("TenantShadow", DataType::String, Value::Null, json!("t"))
				},
				TrackedProperty {
					is_concurrency_token: true,
					..TrackedProperty::scalar("RowVersion", DataType::Bytes, Value::Null, json!("AAE="))
				},
				TrackedProperty {
					is_indexer: true,
					..TrackedProperty::scalar("Item", DataType::String, Value::Null, json!("i"))
				},
				TrackedProperty {
					is_foreign_key: true,
					is_nullable: false,
					..TrackedProperty::scalar("OwnerId", DataType::Integer, Value::Null, json!(3))
				},
				TrackedProperty::scalar("Address", DataType::Complex, Value::Null, json!({"city": "Oslo"})),
				TrackedProperty {
					is_foreign_key: true,
					..TrackedProperty::scalar("ManagerId", DataType::Integer, Value::Null, json!(9))
				},
			],
		)]);

		let names: Vec<&str> = diffs[0].changes.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["ManagerId"]);
	}

	#[test]
	fn composite_keys_join_with_pipe() {
		let diffs = build_diffs(&[entry(
			EntryState::Added,
			vec![
				TrackedProperty::key("TenantId", DataType::String, json!("t1")),
				TrackedProperty::key("Code", DataType::Integer, json!(42)),
				TrackedProperty::scalar("Name", DataType::String, Value::Null, json!("x")),
			],
		)]);
		assert_eq!(diffs[0].key, "TenantId:t1|Code:42");
	}

	#[test]
	fn missing_key_uses_placeholder() {
		let diffs = build_diffs(&[entry(
			EntryState::Added,
			vec![TrackedProperty::scalar("Name", DataType::String, Value::Null, json!("x"))],
		)]);
		assert_eq!(diffs[0].key, "<no-key>");
	}

	#[test]
	fn sensitive_properties_are_flagged_not_masked() {
		let diffs = build_diffs(&[entry(
			EntryState::Modified,
			vec![TrackedProperty::scalar(
				"PasswordHash",
				DataType::String,
				json!("old"),
				json!("new"),
			)],
		)]);

		let change = &diffs[0].changes[0];
		assert!(change.is_sensitive);
		assert_eq!(change.old_value, json!("old"));
		assert_eq!(change.new_value, json!("new"));
	}

	#[test]
	fn into_event_masks_sensitive_values() {
		let diffs = build_diffs(&[entry(
			EntryState::Added,
			vec![
				TrackedProperty::key("Id", DataType::Integer, json!(1)),
				TrackedProperty::scalar("ApiSecret", DataType::String, Value::Null, json!("s3cr3t")),
				TrackedProperty::scalar("Name", DataType::String, Value::Null, json!("x")),
			],
		)]);

		let event = diffs.into_iter().next().unwrap().into_event();
		assert_eq!(event.event_type(), AuditEventType::EntityChange);

		let changes = event.payload()["changes"].as_array().unwrap();
		assert_eq!(changes[0]["name"], "ApiSecret");
		assert_eq!(changes[0]["old_value"], Value::Null);
		assert_eq!(changes[0]["new_value"], "****");
		assert_eq!(changes[1]["new_value"], "x");
		assert_eq!(event.payload()["operation"], "insert");
	}
}
