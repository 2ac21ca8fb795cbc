// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{AuditPipelineConfigLayer, HttpCaptureConfigLayer};

/// Pipeline configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfigLayer {
	#[serde(default)]
	pub audit: Option<AuditPipelineConfigLayer>,
	#[serde(default)]
	pub http_capture: Option<HttpCaptureConfigLayer>,
}

impl PipelineConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: PipelineConfigLayer) {
		merge_option(&mut self.audit, other.audit, AuditPipelineConfigLayer::merge);
		merge_option(
			&mut self.http_capture,
			other.http_capture,
			HttpCaptureConfigLayer::merge,
		);
	}
}

fn merge_option<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => merge(b, o),
		(None, Some(o)) => *base = Some(o),
		_ => {}
	}
}
