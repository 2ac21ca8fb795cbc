// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Trail audit pipeline.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of queue/batch bounds before the pipeline starts
//! - Consistent environment variable naming (`TRAIL_AUDIT_*`, `TRAIL_HTTP_*`)
//!
//! # Usage
//!
//! ```ignore
//! use trail_audit_config::load_config;
//!
//! let config = load_config()?;
//! println!("batching {} events", config.audit.batch_size);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::PipelineConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

const SEVERITY_NAMES: &[&str] = &["information", "warning", "error", "critical"];

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
	pub audit: AuditPipelineConfig,
	pub http_capture: HttpCaptureConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TRAIL_*`)
/// 2. Config file (`/etc/trail/audit.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PipelineConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<PipelineConfig, ConfigError> {
	let mut merged = PipelineConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<PipelineConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<PipelineConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PipelineConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: PipelineConfigLayer) -> Result<PipelineConfig, ConfigError> {
	let audit = layer.audit.unwrap_or_default().finalize();
	let http_capture = layer.http_capture.unwrap_or_default().finalize();

	validate_config(&audit, &http_capture)?;

	info!(
		audit_enabled = audit.enabled,
		queue_capacity = audit.queue_capacity,
		batch_size = audit.batch_size,
		flush_interval_ms = audit.flush_interval_ms,
		capture_bodies = http_capture.capture_bodies,
		min_exception_severity = %http_capture.min_exception_severity,
		"audit pipeline configuration loaded"
	);

	Ok(PipelineConfig {
		audit,
		http_capture,
	})
}

fn validate_config(
	audit: &AuditPipelineConfig,
	http_capture: &HttpCaptureConfig,
) -> Result<(), ConfigError> {
	if audit.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"audit.queue_capacity must be at least 1".to_string(),
		));
	}
	if audit.batch_size == 0 {
		return Err(ConfigError::Validation(
			"audit.batch_size must be at least 1".to_string(),
		));
	}
	if audit.batch_size > audit.queue_capacity {
		return Err(ConfigError::Validation(format!(
			"audit.batch_size ({}) exceeds audit.queue_capacity ({})",
			audit.batch_size, audit.queue_capacity
		)));
	}
	if audit.flush_interval_ms == 0 {
		return Err(ConfigError::Validation(
			"audit.flush_interval_ms must be at least 1".to_string(),
		));
	}
	if !SEVERITY_NAMES.contains(&http_capture.min_exception_severity.as_str()) {
		return Err(ConfigError::InvalidValue {
			key: "http_capture.min_exception_severity".to_string(),
			message: format!(
				"'{}' is not one of {}",
				http_capture.min_exception_severity,
				SEVERITY_NAMES.join(", ")
			),
		});
	}
	Ok(())
}
