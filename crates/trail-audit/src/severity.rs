// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Maps failures to audit severities.
//!
//! The classifier walks the error's `source()` chain, so wrapper errors that
//! carry a [`Cancelled`] or [`Forbidden`] as their cause are classified like
//! the cause itself.

use std::any::Any;
use std::error::Error;
use std::fmt;

use crate::envelope::AuditSeverity;

/// Marker error for an operation that was cancelled.
///
/// Custom cancellation errors should return a `Cancelled` from `source()` to
/// be recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cancelled {
	reason: Option<String>,
}

impl Cancelled {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_reason(reason: impl Into<String>) -> Self {
		Self {
			reason: Some(reason.into()),
		}
	}
}

impl fmt::Display for Cancelled {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.reason {
			Some(reason) => write!(f, "operation cancelled: {reason}"),
			None => write!(f, "operation cancelled"),
		}
	}
}

impl Error for Cancelled {}

/// Marker error for an authorization or permission failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forbidden {
	message: String,
}

impl Forbidden {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}

impl fmt::Display for Forbidden {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "forbidden: {}", self.message)
	}
}

impl Error for Forbidden {}

/// Classify a failure. Cancellation anywhere in the chain wins over an
/// authorization failure; anything else is [`AuditSeverity::Error`].
///
/// Never returns [`AuditSeverity::Critical`]; that level is left to callers
/// that escalate explicitly.
pub fn classify(error: &(dyn Error + 'static)) -> AuditSeverity {
	if chain(error).any(is_cancellation) {
		return AuditSeverity::Information;
	}
	if chain(error).any(is_authorization_failure) {
		return AuditSeverity::Warning;
	}
	AuditSeverity::Error
}

/// A panic in a handler is always an [`AuditSeverity::Error`].
pub fn classify_panic(_payload: &(dyn Any + Send)) -> AuditSeverity {
	AuditSeverity::Error
}

/// Extract the message from a panic payload raised with a string literal or a
/// formatted string.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		return Some(s);
	}
	payload.downcast_ref::<String>().map(String::as_str)
}

fn chain<'a>(
	error: &'a (dyn Error + 'static),
) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
	std::iter::successors(Some(error), |e: &&'a (dyn Error + 'static)| (*e).source())
}

fn is_cancellation(error: &(dyn Error + 'static)) -> bool {
	if error.is::<Cancelled>() {
		return true;
	}
	if let Some(join) = error.downcast_ref::<tokio::task::JoinError>() {
		return join.is_cancelled();
	}
	false
}

fn is_authorization_failure(error: &(dyn Error + 'static)) -> bool {
	if error.is::<Forbidden>() {
		return true;
	}
	if let Some(io) = error.downcast_ref::<std::io::Error>() {
		return io.kind() == std::io::ErrorKind::PermissionDenied;
	}
	false
}
