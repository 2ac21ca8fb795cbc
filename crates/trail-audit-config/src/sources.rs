// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::PipelineConfigLayer;
use crate::sections::{AuditPipelineConfigLayer, HttpCaptureConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PipelineConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PipelineConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PipelineConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/trail/audit.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PipelineConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PipelineConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PipelineConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TRAIL_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PipelineConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PipelineConfigLayer {
			audit: Some(load_audit_from_env()?),
			http_capture: Some(load_http_capture_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| {
		v.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_audit_from_env() -> Result<AuditPipelineConfigLayer, ConfigError> {
	Ok(AuditPipelineConfigLayer {
		enabled: env_bool("TRAIL_AUDIT_ENABLED"),
		queue_capacity: env_parse("TRAIL_AUDIT_QUEUE_CAPACITY", "usize")?,
		batch_size: env_parse("TRAIL_AUDIT_BATCH_SIZE", "usize")?,
		flush_interval_ms: env_parse("TRAIL_AUDIT_FLUSH_INTERVAL_MS", "u64")?,
		failure_backoff_ms: env_parse("TRAIL_AUDIT_FAILURE_BACKOFF_MS", "u64")?,
		shutdown_flush_timeout_ms: env_parse("TRAIL_AUDIT_SHUTDOWN_FLUSH_TIMEOUT_MS", "u64")?,
		extra_sensitive_keywords: env_list("TRAIL_AUDIT_EXTRA_SENSITIVE_KEYWORDS"),
	})
}

fn load_http_capture_from_env() -> Result<HttpCaptureConfigLayer, ConfigError> {
	Ok(HttpCaptureConfigLayer {
		capture_bodies: env_bool("TRAIL_HTTP_CAPTURE_BODIES"),
		max_request_body_bytes: env_parse("TRAIL_HTTP_MAX_REQUEST_BODY_BYTES", "usize")?,
		max_response_body_bytes: env_parse("TRAIL_HTTP_MAX_RESPONSE_BODY_BYTES", "usize")?,
		json_content_types: env_list("TRAIL_HTTP_JSON_CONTENT_TYPES"),
		excluded_path_prefixes: env_list("TRAIL_HTTP_EXCLUDED_PATH_PREFIXES"),
		min_exception_severity: env_var("TRAIL_HTTP_MIN_EXCEPTION_SEVERITY"),
	})
}
