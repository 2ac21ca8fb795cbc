// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use tracing::warn;
use trail_audit::AuditSeverity;
use trail_audit_config::HttpCaptureConfig;

/// Resolved capture settings used by [`AuditCaptureLayer`](crate::AuditCaptureLayer).
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
	pub capture_bodies: bool,
	pub max_request_body_bytes: usize,
	pub max_response_body_bytes: usize,
	pub json_content_types: Vec<String>,
	pub excluded_path_prefixes: Vec<String>,
	pub min_exception_severity: AuditSeverity,
}

impl From<&HttpCaptureConfig> for CaptureSettings {
	fn from(config: &HttpCaptureConfig) -> Self {
		let min_exception_severity = config
			.min_exception_severity
			.parse()
			.unwrap_or_else(|e| {
				warn!(error = %e, "invalid min_exception_severity, using warning");
				AuditSeverity::Warning
			});

		Self {
			capture_bodies: config.capture_bodies,
			max_request_body_bytes: config.max_request_body_bytes,
			max_response_body_bytes: config.max_response_body_bytes,
			json_content_types: config
				.json_content_types
				.iter()
				.map(|t| t.trim().to_ascii_lowercase())
				.collect(),
			excluded_path_prefixes: config.excluded_path_prefixes.clone(),
			min_exception_severity,
		}
	}
}

impl Default for CaptureSettings {
	fn default() -> Self {
		Self::from(&HttpCaptureConfig::default())
	}
}

impl CaptureSettings {
	pub fn is_excluded(&self, path: &str) -> bool {
		self.excluded_path_prefixes
			.iter()
			.any(|prefix| path.starts_with(prefix.as_str()))
	}

	/// True when the media type (parameters stripped, case-insensitive) is in
	/// the JSON allow-list.
	pub fn is_json(&self, headers: &HeaderMap) -> bool {
		media_type(headers).is_some_and(|media| self.json_content_types.iter().any(|t| *t == media))
	}
}

fn media_type(headers: &HeaderMap) -> Option<String> {
	let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
	let media = value.split(';').next()?.trim();
	if media.is_empty() {
		return None;
	}
	Some(media.to_ascii_lowercase())
}

/// Declared `content-length`, if present and well-formed.
pub fn content_length(headers: &HeaderMap) -> Option<usize> {
	headers
		.get(CONTENT_LENGTH)?
		.to_str()
		.ok()?
		.trim()
		.parse()
		.ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::HeaderValue;

	fn headers(content_type: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
		headers
	}

	#[test]
	fn defaults_match_config_defaults() {
		let settings = CaptureSettings::default();
		assert!(settings.capture_bodies);
		assert_eq!(settings.min_exception_severity, AuditSeverity::Warning);
		assert_eq!(settings.max_request_body_bytes, 32 * 1024);
	}

	#[test]
	fn json_detection_ignores_parameters_and_case() {
		let settings = CaptureSettings::default();
		assert!(settings.is_json(&headers("application/json")));
		assert!(settings.is_json(&headers("Application/JSON; charset=utf-8")));
		assert!(settings.is_json(&headers("application/problem+json")));
		assert!(!settings.is_json(&headers("application/jsonp")));
		assert!(!settings.is_json(&headers("text/html")));
		assert!(!settings.is_json(&HeaderMap::new()));
	}

	#[test]
	fn excluded_prefixes() {
		let settings = CaptureSettings::default();
		assert!(settings.is_excluded("/health"));
		assert!(settings.is_excluded("/health/live"));
		assert!(settings.is_excluded("/metrics"));
		assert!(!settings.is_excluded("/api/health"));
	}

	#[test]
	fn invalid_severity_falls_back_to_warning() {
		let config = HttpCaptureConfig {
			min_exception_severity: "loud".to_string(),
			..HttpCaptureConfig::default()
		};
		assert_eq!(
			CaptureSettings::from(&config).min_exception_severity,
			AuditSeverity::Warning
		);
	}

	#[test]
	fn parses_content_length() {
		let mut headers = HeaderMap::new();
		assert_eq!(content_length(&headers), None);
		headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
		assert_eq!(content_length(&headers), Some(42));
		headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
		assert_eq!(content_length(&headers), None);
	}
}
