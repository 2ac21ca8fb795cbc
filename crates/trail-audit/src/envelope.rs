// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit event model: event types, severities, tags, and the immutable envelope.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::{backfill, is_blank, AuditScope};

/// Closed set of audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	Activity,
	Security,
	EntityChange,
	Exception,
	HealthCheck,
}

impl fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditEventType::Activity => "activity",
			AuditEventType::Security => "security",
			AuditEventType::EntityChange => "entity_change",
			AuditEventType::Exception => "exception",
			AuditEventType::HealthCheck => "health_check",
		};
		write!(f, "{s}")
	}
}

/// Audit severity, ordered from least to most severe.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	#[default]
	Information,
	Warning,
	Error,
	Critical,
}

impl AuditSeverity {
	/// Returns all severity levels from least to most severe.
	pub fn all() -> &'static [AuditSeverity] {
		&[
			AuditSeverity::Information,
			AuditSeverity::Warning,
			AuditSeverity::Error,
			AuditSeverity::Critical,
		]
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Information => "information",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
			AuditSeverity::Critical => "critical",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit severity '{0}'")]
pub struct ParseSeverityError(String);

impl FromStr for AuditSeverity {
	type Err = ParseSeverityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"information" | "info" => Ok(AuditSeverity::Information),
			"warning" | "warn" => Ok(AuditSeverity::Warning),
			"error" => Ok(AuditSeverity::Error),
			"critical" => Ok(AuditSeverity::Critical),
			_ => Err(ParseSeverityError(s.to_string())),
		}
	}
}

/// Auxiliary classification flags, combinable with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTags(u32);

impl AuditTags {
	pub const NONE: AuditTags = AuditTags(0);
	pub const PII_MASKED: AuditTags = AuditTags(1 << 0);
	pub const AUTHENTICATION: AuditTags = AuditTags(1 << 1);
	pub const RETAINED_LONG: AuditTags = AuditTags(1 << 2);
	pub const HEALTH_CHECK: AuditTags = AuditTags(1 << 3);

	pub fn bits(self) -> u32 {
		self.0
	}

	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// True when every flag in `other` is also set in `self`.
	pub fn contains(self, other: AuditTags) -> bool {
		self.0 & other.0 == other.0
	}
}

impl BitOr for AuditTags {
	type Output = AuditTags;

	fn bitor(self, rhs: AuditTags) -> AuditTags {
		AuditTags(self.0 | rhs.0)
	}
}

impl BitOrAssign for AuditTags {
	fn bitor_assign(&mut self, rhs: AuditTags) {
		self.0 |= rhs.0;
	}
}

/// An audit event as built by a producer, before the pipeline stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
	occurred_at: DateTime<Utc>,
	event_type: AuditEventType,
	severity: AuditSeverity,
	tenant_id: Option<String>,
	user_id: Option<String>,
	user_name: Option<String>,
	trace_id: Option<String>,
	span_id: Option<String>,
	correlation_id: Option<String>,
	request_id: Option<String>,
	source: String,
	tags: AuditTags,
	payload: serde_json::Value,
}

impl AuditEvent {
	/// Create a new audit event builder for the given event type.
	pub fn builder(event_type: AuditEventType) -> AuditEventBuilder {
		AuditEventBuilder::new(event_type)
	}

	pub fn event_type(&self) -> AuditEventType {
		self.event_type
	}

	pub fn severity(&self) -> AuditSeverity {
		self.severity
	}

	pub fn payload(&self) -> &serde_json::Value {
		&self.payload
	}
}

/// Builder for constructing audit events with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
	event: AuditEvent,
}

impl AuditEventBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event: AuditEvent {
				occurred_at: Utc::now(),
				event_type,
				severity: AuditSeverity::Information,
				tenant_id: None,
				user_id: None,
				user_name: None,
				trace_id: None,
				span_id: None,
				correlation_id: None,
				request_id: None,
				source: String::new(),
				tags: AuditTags::NONE,
				payload: serde_json::Value::Null,
			},
		}
	}

	/// Set when the event happened. Any offset is normalized to UTC.
	pub fn occurred_at<Tz: TimeZone>(mut self, at: DateTime<Tz>) -> Self {
		self.event.occurred_at = at.with_timezone(&Utc);
		self
	}

	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.event.severity = severity;
		self
	}

	pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
		self.event.tenant_id = Some(tenant_id.into());
		self
	}

	pub fn user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
		self.event.user_id = Some(user_id.into());
		self.event.user_name = Some(user_name.into());
		self
	}

	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.event.user_id = Some(user_id.into());
		self
	}

	pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
		self.event.trace_id = Some(trace_id.into());
		self
	}

	pub fn span_id(mut self, span_id: impl Into<String>) -> Self {
		self.event.span_id = Some(span_id.into());
		self
	}

	pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
		self.event.correlation_id = Some(correlation_id.into());
		self
	}

	pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
		self.event.request_id = Some(request_id.into());
		self
	}

	/// Free-text origin tag, e.g. `"api"`.
	pub fn source(mut self, source: impl Into<String>) -> Self {
		self.event.source = source.into();
		self
	}

	/// Add tags to the event. Repeated calls accumulate.
	pub fn tags(mut self, tags: AuditTags) -> Self {
		self.event.tags |= tags;
		self
	}

	/// Attach the event payload. Callers mask it first; see [`crate::masking`].
	pub fn payload(mut self, payload: serde_json::Value) -> Self {
		self.event.payload = payload;
		self
	}

	pub fn build(self) -> AuditEvent {
		self.event
	}
}

/// The canonical, immutable audit record that flows through the pipeline.
///
/// Fields are only readable. Enrichment such as
/// [`with_scope_backfill`](AuditEnvelope::with_scope_backfill) consumes the
/// envelope and returns a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEnvelope {
	id: Uuid,
	occurred_at: DateTime<Utc>,
	received_at: DateTime<Utc>,
	event_type: AuditEventType,
	severity: AuditSeverity,
	tenant_id: Option<String>,
	user_id: Option<String>,
	user_name: Option<String>,
	trace_id: Option<String>,
	span_id: Option<String>,
	correlation_id: Option<String>,
	request_id: Option<String>,
	source: String,
	tags: AuditTags,
	payload: serde_json::Value,
}

impl AuditEnvelope {
	/// Stamp an event with a fresh, time-ordered id and `received_at = now`.
	pub fn from_event(event: AuditEvent) -> Self {
		Self {
			id: Uuid::now_v7(),
			occurred_at: event.occurred_at,
			received_at: Utc::now(),
			event_type: event.event_type,
			severity: event.severity,
			tenant_id: event.tenant_id,
			user_id: event.user_id,
			user_name: event.user_name,
			trace_id: event.trace_id,
			span_id: event.span_id,
			correlation_id: event.correlation_id,
			request_id: event.request_id,
			source: event.source,
			tags: event.tags,
			payload: event.payload,
		}
	}

	/// Return a copy whose unset identity and correlation fields are filled
	/// from `scope`. Set fields are never overwritten.
	///
	/// `user_id` and `user_name` travel together: they are only taken from
	/// the scope when the envelope has no `user_id` of its own.
	pub fn with_scope_backfill(self, scope: &AuditScope) -> Self {
		let (user_id, user_name) = if is_blank(&self.user_id) {
			(
				backfill(self.user_id, &scope.user_id),
				backfill(self.user_name, &scope.user_name),
			)
		} else {
			(self.user_id, self.user_name)
		};

		Self {
			tenant_id: backfill(self.tenant_id, &scope.tenant_id),
			user_id,
			user_name,
			correlation_id: backfill(self.correlation_id, &scope.correlation_id),
			request_id: backfill(self.request_id, &scope.request_id),
			..self
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn occurred_at(&self) -> DateTime<Utc> {
		self.occurred_at
	}

	pub fn received_at(&self) -> DateTime<Utc> {
		self.received_at
	}

	pub fn event_type(&self) -> AuditEventType {
		self.event_type
	}

	pub fn severity(&self) -> AuditSeverity {
		self.severity
	}

	pub fn tenant_id(&self) -> Option<&str> {
		self.tenant_id.as_deref()
	}

	pub fn user_id(&self) -> Option<&str> {
		self.user_id.as_deref()
	}

	pub fn user_name(&self) -> Option<&str> {
		self.user_name.as_deref()
	}

	pub fn trace_id(&self) -> Option<&str> {
		self.trace_id.as_deref()
	}

	pub fn span_id(&self) -> Option<&str> {
		self.span_id.as_deref()
	}

	pub fn correlation_id(&self) -> Option<&str> {
		self.correlation_id.as_deref()
	}

	pub fn request_id(&self) -> Option<&str> {
		self.request_id.as_deref()
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn tags(&self) -> AuditTags {
		self.tags
	}

	pub fn payload(&self) -> &serde_json::Value {
		&self.payload
	}
}

impl From<AuditEvent> for AuditEnvelope {
	fn from(event: AuditEvent) -> Self {
		AuditEnvelope::from_event(event)
	}
}

/// Anything the publisher accepts: a fresh event, or an envelope that was
/// already stamped (for example, replayed from elsewhere).
#[derive(Debug, Clone)]
pub enum Publishable {
	Event(AuditEvent),
	Envelope(AuditEnvelope),
}

impl Publishable {
	/// Envelopes pass through untouched; events get a new id and receive time.
	pub fn into_envelope(self) -> AuditEnvelope {
		match self {
			Publishable::Event(event) => AuditEnvelope::from_event(event),
			Publishable::Envelope(envelope) => envelope,
		}
	}
}

impl From<AuditEvent> for Publishable {
	fn from(event: AuditEvent) -> Self {
		Publishable::Event(event)
	}
}

impl From<AuditEnvelope> for Publishable {
	fn from(envelope: AuditEnvelope) -> Self {
		Publishable::Envelope(envelope)
	}
}
