// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod audit;
mod http_capture;

pub use audit::{AuditPipelineConfig, AuditPipelineConfigLayer};
pub use http_capture::{HttpCaptureConfig, HttpCaptureConfigLayer};
