// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP capture middleware for the Trail audit pipeline.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/items", post(create_item))
//!     .layer(AuditCaptureLayer::new(pipeline.publisher(), config.http_capture.clone())
//!         .with_masker(pipeline.masker().clone()));
//! ```
//!
//! Upstream middleware can attach an [`AuditScope`](trail_audit::AuditScope)
//! to the request extensions; the layer reads it for tenant and user fields.

pub mod layer;
pub mod settings;
pub mod trace;

pub use layer::{AuditCaptureFuture, AuditCaptureLayer, AuditCaptureService};
pub use settings::CaptureSettings;
pub use trace::{parse_traceparent, TraceContext, REQUEST_ID_HEADER, TRACEPARENT_HEADER};
