// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP request/response capture configuration section.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024;
const DEFAULT_MIN_EXCEPTION_SEVERITY: &str = "warning";

fn default_json_content_types() -> Vec<String> {
	vec![
		"application/json".to_string(),
		"application/problem+json".to_string(),
	]
}

fn default_excluded_path_prefixes() -> Vec<String> {
	vec!["/health".to_string(), "/metrics".to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpCaptureConfigLayer {
	pub capture_bodies: Option<bool>,
	pub max_request_body_bytes: Option<usize>,
	pub max_response_body_bytes: Option<usize>,
	pub json_content_types: Option<Vec<String>>,
	pub excluded_path_prefixes: Option<Vec<String>>,
	pub min_exception_severity: Option<String>,
}

impl HttpCaptureConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.capture_bodies.is_some() {
			self.capture_bodies = other.capture_bodies;
		}
		if other.max_request_body_bytes.is_some() {
			self.max_request_body_bytes = other.max_request_body_bytes;
		}
		if other.max_response_body_bytes.is_some() {
			self.max_response_body_bytes = other.max_response_body_bytes;
		}
		if other.json_content_types.is_some() {
			self.json_content_types = other.json_content_types;
		}
		if other.excluded_path_prefixes.is_some() {
			self.excluded_path_prefixes = other.excluded_path_prefixes;
		}
		if other.min_exception_severity.is_some() {
			self.min_exception_severity = other.min_exception_severity;
		}
	}

	pub fn finalize(self) -> HttpCaptureConfig {
		HttpCaptureConfig {
			capture_bodies: self.capture_bodies.unwrap_or(true),
			max_request_body_bytes: self
				.max_request_body_bytes
				.unwrap_or(DEFAULT_MAX_BODY_BYTES),
			max_response_body_bytes: self
				.max_response_body_bytes
				.unwrap_or(DEFAULT_MAX_BODY_BYTES),
			json_content_types: self
				.json_content_types
				.unwrap_or_else(default_json_content_types)
				.into_iter()
				.map(|t| t.trim().to_ascii_lowercase())
				.filter(|t| !t.is_empty())
				.collect(),
			excluded_path_prefixes: self
				.excluded_path_prefixes
				.unwrap_or_else(default_excluded_path_prefixes),
			min_exception_severity: self
				.min_exception_severity
				.map(|s| s.trim().to_ascii_lowercase())
				.unwrap_or_else(|| DEFAULT_MIN_EXCEPTION_SEVERITY.to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpCaptureConfig {
	/// Buffer and preview JSON bodies. Sizes and status are always recorded.
	pub capture_bodies: bool,
	pub max_request_body_bytes: usize,
	pub max_response_body_bytes: usize,
	/// Lower-cased media types (without parameters) treated as JSON.
	pub json_content_types: Vec<String>,
	pub excluded_path_prefixes: Vec<String>,
	/// One of `information`, `warning`, `error`, `critical`.
	pub min_exception_severity: String,
}

impl Default for HttpCaptureConfig {
	fn default() -> Self {
		HttpCaptureConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = HttpCaptureConfig::default();
		assert!(config.capture_bodies);
		assert_eq!(config.max_request_body_bytes, 32 * 1024);
		assert_eq!(config.max_response_body_bytes, 32 * 1024);
		assert_eq!(
			config.json_content_types,
			vec!["application/json", "application/problem+json"]
		);
		assert_eq!(config.excluded_path_prefixes, vec!["/health", "/metrics"]);
		assert_eq!(config.min_exception_severity, "warning");
	}

	#[test]
	fn test_content_types_are_normalized() {
		let layer = HttpCaptureConfigLayer {
			json_content_types: Some(vec![
				" Application/JSON ".to_string(),
				"application/vnd.api+json".to_string(),
			]),
			min_exception_severity: Some(" Error ".to_string()),
			..Default::default()
		};
		let config = layer.finalize();
		assert_eq!(
			config.json_content_types,
			vec!["application/json", "application/vnd.api+json"]
		);
		assert_eq!(config.min_exception_severity, "error");
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base = HttpCaptureConfigLayer {
			capture_bodies: Some(false),
			max_request_body_bytes: Some(1024),
			..Default::default()
		};
		base.merge(HttpCaptureConfigLayer {
			max_request_body_bytes: Some(2048),
			..Default::default()
		});
		assert_eq!(base.capture_bodies, Some(false));
		assert_eq!(base.max_request_body_bytes, Some(2048));
	}
}
