// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity and correlation context for one unit of work.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of who is acting and which request or job the work
/// belongs to.
///
/// A scope is passed explicitly to [`AuditPublisher::publish`](crate::AuditPublisher::publish).
/// HTTP handlers get one from request extensions, inserted by upstream
/// authentication middleware. The default scope has every field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditScope {
	pub tenant_id: Option<String>,
	pub user_id: Option<String>,
	pub user_name: Option<String>,
	pub correlation_id: Option<String>,
	pub request_id: Option<String>,
}

impl AuditScope {
	pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
		self.tenant_id = Some(tenant_id.into());
		self
	}

	pub fn with_user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self.user_name = Some(user_name.into());
		self
	}

	pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
		self.correlation_id = Some(correlation_id.into());
		self
	}

	pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = Some(request_id.into());
		self
	}
}

/// Empty and whitespace-only strings count as unset.
pub(crate) fn is_blank(value: &Option<String>) -> bool {
	value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Keeps `current` unless it is blank, in which case the ambient value (if
/// any) takes its place.
pub(crate) fn backfill(current: Option<String>, ambient: &Option<String>) -> Option<String> {
	if !is_blank(&current) || is_blank(ambient) {
		return current;
	}
	ambient.clone()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_scope_is_empty() {
		let scope = AuditScope::default();
		assert!(scope.tenant_id.is_none());
		assert!(scope.user_id.is_none());
		assert!(scope.user_name.is_none());
		assert!(scope.correlation_id.is_none());
		assert!(scope.request_id.is_none());
	}

	#[test]
	fn blank_detection() {
		assert!(is_blank(&None));
		assert!(is_blank(&Some(String::new())));
		assert!(is_blank(&Some("  \t".to_string())));
		assert!(!is_blank(&Some("t1".to_string())));
	}

	#[test]
	fn backfill_never_replaces_set_value() {
		let ambient = Some("scope-tenant".to_string());
		assert_eq!(
			backfill(Some("own".to_string()), &ambient),
			Some("own".to_string())
		);
		assert_eq!(backfill(None, &ambient), ambient);
		assert_eq!(backfill(Some(" ".to_string()), &ambient), ambient);
	}

	#[test]
	fn backfill_ignores_blank_ambient() {
		assert_eq!(backfill(None, &Some("".to_string())), None);
	}
}
