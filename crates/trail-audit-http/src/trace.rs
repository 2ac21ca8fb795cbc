// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request correlation: transport request ids and W3C `traceparent`.

use http::HeaderMap;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Trace and span ids from a W3C `traceparent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
	pub trace_id: String,
	pub span_id: String,
}

/// The `x-request-id` header when present and non-blank, otherwise a fresh
/// UUID v7.
pub fn request_trace_id(headers: &HeaderMap) -> String {
	headers
		.get(REQUEST_ID_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
		.unwrap_or_else(|| Uuid::now_v7().to_string())
}

pub fn trace_context(headers: &HeaderMap) -> Option<TraceContext> {
	let value = headers.get(TRACEPARENT_HEADER)?.to_str().ok()?;
	parse_traceparent(value)
}

/// Parse `version-traceid-spanid-flags`. All-zero ids are invalid.
pub fn parse_traceparent(value: &str) -> Option<TraceContext> {
	let mut parts = value.trim().split('-');
	let version = parts.next()?;
	let trace_id = parts.next()?;
	let span_id = parts.next()?;
	let flags = parts.next()?;

	if version.len() != 2 || version.eq_ignore_ascii_case("ff") || !is_hex(version) {
		return None;
	}
	// Version 00 has exactly four fields.
	if version == "00" && parts.next().is_some() {
		return None;
	}
	if flags.len() != 2 || !is_hex(flags) {
		return None;
	}
	if !is_valid_id(trace_id, 32) || !is_valid_id(span_id, 16) {
		return None;
	}

	Some(TraceContext {
		trace_id: trace_id.to_ascii_lowercase(),
		span_id: span_id.to_ascii_lowercase(),
	})
}

fn is_hex(s: &str) -> bool {
	s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_valid_id(s: &str, len: usize) -> bool {
	s.len() == len && is_hex(s) && s.bytes().any(|b| b != b'0')
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::HeaderValue;

	#[test]
	fn parses_valid_traceparent() {
		let ctx =
			parse_traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();
		assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
		assert_eq!(ctx.span_id, "00f067aa0ba902b7");
	}

	#[test]
	fn rejects_malformed_traceparent() {
		for value in [
			"",
			"00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
			"00-00000000000000000000000000000000-00f067aa0ba902b7-01",
			"00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
			"00-4bf92f3577b34da6a3ce929d0e0e473-00f067aa0ba902b7-01",
			"ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
			"00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
			"00-zzf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
		] {
			assert!(parse_traceparent(value).is_none(), "accepted {value:?}");
		}
	}

	#[test]
	fn request_id_header_wins() {
		let mut headers = HeaderMap::new();
		headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
		assert_eq!(request_trace_id(&headers), "req-42");
	}

	#[test]
	fn missing_request_id_generates_uuid() {
		let id = request_trace_id(&HeaderMap::new());
		let parsed = Uuid::parse_str(&id).unwrap();
		assert_eq!(parsed.get_version_num(), 7);
	}
}
