// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sensitive-field masking for audit payloads and captured bodies.
//!
//! Any object key containing one of the sensitive keywords (ASCII
//! case-insensitive substring match) has its whole value replaced by
//! [`REDACTION_MARKER`]. Everything else keeps its structure, key order, and
//! primitive types. Containers nested deeper than the depth cap are replaced
//! by the marker as a whole.

use serde_json::Value;

/// Replacement written in place of a sensitive value.
pub const REDACTION_MARKER: &str = "****";

/// Built-in keywords, lower-case.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
	"password",
	"secret",
	"token",
	"otp",
	"pin",
	"accesstoken",
	"refreshtoken",
];

const MAX_DEPTH: usize = 128;

/// Masks sensitive fields using the built-in keyword set.
pub fn mask(value: &Value) -> Value {
	let mut cloned = value.clone();
	mask_in_place(&mut cloned);
	cloned
}

/// Masks sensitive fields in-place using the built-in keyword set.
pub fn mask_in_place(value: &mut Value) {
	mask_with_depth(value, &|key: &str| is_sensitive_key(key, &[]), 0);
}

/// Parse a captured body as JSON and mask it. Returns `None` if the bytes are
/// not valid JSON.
pub fn mask_json_bytes(bytes: &[u8]) -> Option<Value> {
	Masker::default().mask_json_bytes(bytes)
}

/// True when `key` contains a built-in keyword or one of `extra`.
///
/// `extra` entries must already be lower-case.
pub fn is_sensitive_key(key: &str, extra: &[String]) -> bool {
	let key = key.to_ascii_lowercase();
	SENSITIVE_KEYWORDS.iter().any(|k| key.contains(k))
		|| extra.iter().any(|k| key.contains(k.as_str()))
}

/// Masking engine with configurable extra keywords.
#[derive(Debug, Clone, Default)]
pub struct Masker {
	extra_keywords: Vec<String>,
}

impl Masker {
	/// Extend the built-in keyword set. Keywords are matched
	/// case-insensitively; blank entries are ignored.
	pub fn with_keywords<I, S>(keywords: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self {
			extra_keywords: keywords
				.into_iter()
				.map(|k| k.as_ref().trim().to_ascii_lowercase())
				.filter(|k| !k.is_empty())
				.collect(),
		}
	}

	pub fn is_sensitive(&self, key: &str) -> bool {
		is_sensitive_key(key, &self.extra_keywords)
	}

	pub fn mask(&self, value: &Value) -> Value {
		let mut cloned = value.clone();
		self.mask_in_place(&mut cloned);
		cloned
	}

	pub fn mask_in_place(&self, value: &mut Value) {
		mask_with_depth(value, &|key: &str| self.is_sensitive(key), 0);
	}

	pub fn mask_json_bytes(&self, bytes: &[u8]) -> Option<Value> {
		let mut value: Value = serde_json::from_slice(bytes).ok()?;
		self.mask_in_place(&mut value);
		Some(value)
	}
}

fn mask_with_depth(value: &mut Value, is_sensitive: &dyn Fn(&str) -> bool, depth: usize) {
	if depth > MAX_DEPTH {
		// Too deep to inspect: containers are redacted whole.
		if value.is_object() || value.is_array() {
			*value = Value::String(REDACTION_MARKER.to_string());
		}
		return;
	}

	match value {
		Value::Object(obj) => {
			for (key, v) in obj.iter_mut() {
				if is_sensitive(key) {
					*v = Value::String(REDACTION_MARKER.to_string());
				} else {
					mask_with_depth(v, is_sensitive, depth + 1);
				}
			}
		}
		Value::Array(arr) => {
			for item in arr {
				mask_with_depth(item, is_sensitive, depth + 1);
			}
		}
		_ => {}
	}
}
