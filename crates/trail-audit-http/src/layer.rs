// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tower layer that records an audit envelope for every HTTP request.
//!
//! Successful requests produce one Activity envelope. Errors and panics from
//! the inner service produce one Exception envelope (subject to the configured
//! minimum severity) and are then handed back to the caller unchanged.

use std::any::type_name;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::{Body, Bytes};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use http::{Request, Response};
use pin_project_lite::pin_project;
use serde_json::{json, Value};
use tower::{Layer, Service};
use tracing::debug;

use trail_audit::{
	classify, classify_panic, panic_message, AuditEvent, AuditEventBuilder, AuditEventType,
	AuditPublisher, AuditScope, AuditSeverity, Masker,
};
use trail_audit_config::HttpCaptureConfig;

use crate::settings::{content_length, CaptureSettings};
use crate::trace::{request_trace_id, trace_context, TraceContext};

const EVENT_SOURCE: &str = "api";
const EXCEPTION_AREA: &str = "Api";

#[derive(Clone)]
struct CaptureState {
	publisher: AuditPublisher,
	settings: CaptureSettings,
	masker: Masker,
}

/// Layer that wraps services with [`AuditCaptureService`].
#[derive(Clone)]
pub struct AuditCaptureLayer {
	state: Arc<CaptureState>,
}

impl AuditCaptureLayer {
	pub fn new(publisher: AuditPublisher, config: HttpCaptureConfig) -> Self {
		Self {
			state: Arc::new(CaptureState {
				publisher,
				settings: CaptureSettings::from(&config),
				masker: Masker::default(),
			}),
		}
	}

	/// Use `masker` for body previews, e.g. the pipeline's masker carrying
	/// configured extra keywords.
	pub fn with_masker(mut self, masker: Masker) -> Self {
		Arc::make_mut(&mut self.state).masker = masker;
		self
	}

	pub fn settings(&self) -> &CaptureSettings {
		&self.state.settings
	}
}

impl<S> Layer<S> for AuditCaptureLayer {
	type Service = AuditCaptureService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		AuditCaptureService {
			inner,
			state: Arc::clone(&self.state),
		}
	}
}

#[derive(Clone)]
pub struct AuditCaptureService<S> {
	inner: S,
	state: Arc<CaptureState>,
}

impl<S> Service<Request<Body>> for AuditCaptureService<S>
where
	S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
	S::Future: Send + 'static,
	S::Error: Error + Send + Sync + 'static,
{
	type Response = Response<Body>;
	type Error = S::Error;
	type Future = AuditCaptureFuture<S::Future, S::Error>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		if self.state.settings.is_excluded(req.uri().path()) {
			return AuditCaptureFuture::Passthrough {
				fut: self.inner.call(req),
			};
		}

		// The ready clone stays with this call; the fresh clone waits for the
		// next poll_ready.
		let clone = self.inner.clone();
		let inner = std::mem::replace(&mut self.inner, clone);
		let state = Arc::clone(&self.state);

		AuditCaptureFuture::Capturing {
			fut: Box::pin(capture(state, inner, req)),
		}
	}
}

pin_project! {
	#[project = AuditCaptureFutureProj]
	pub enum AuditCaptureFuture<F, E> {
		Passthrough {
			#[pin]
			fut: F,
		},
		Capturing {
			fut: BoxFuture<'static, Result<Response<Body>, E>>,
		},
	}
}

impl<F, E> Future for AuditCaptureFuture<F, E>
where
	F: Future<Output = Result<Response<Body>, E>>,
{
	type Output = Result<Response<Body>, E>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match self.project() {
			AuditCaptureFutureProj::Passthrough { fut } => fut.poll(cx),
			AuditCaptureFutureProj::Capturing { fut } => fut.as_mut().poll(cx),
		}
	}
}

/// Per-request facts shared by the activity and exception envelopes.
struct RequestInfo {
	method: String,
	path: String,
	trace_id: String,
	trace: Option<TraceContext>,
	scope: AuditScope,
}

impl RequestInfo {
	fn from_request(req: &Request<Body>) -> Self {
		let trace_id = request_trace_id(req.headers());
		let mut scope = req
			.extensions()
			.get::<AuditScope>()
			.cloned()
			.unwrap_or_default();
		if is_blank(&scope.correlation_id) {
			scope.correlation_id = Some(trace_id.clone());
		}
		if is_blank(&scope.request_id) {
			scope.request_id = Some(trace_id.clone());
		}

		Self {
			method: req.method().to_string(),
			path: req.uri().path().to_string(),
			trace: trace_context(req.headers()),
			trace_id,
			scope,
		}
	}

	fn event(&self, event_type: AuditEventType) -> AuditEventBuilder {
		let builder = AuditEvent::builder(event_type).source(EVENT_SOURCE);
		match &self.trace {
			Some(ctx) => builder
				.trace_id(ctx.trace_id.clone())
				.span_id(ctx.span_id.clone()),
			None => builder.trace_id(self.trace_id.clone()),
		}
	}
}

fn is_blank(value: &Option<String>) -> bool {
	value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[derive(Debug, Default)]
struct BodyCapture {
	size: usize,
	preview: Option<Value>,
}

async fn capture<S>(
	state: Arc<CaptureState>,
	mut inner: S,
	req: Request<Body>,
) -> Result<Response<Body>, S::Error>
where
	S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
	S::Future: Send + 'static,
	S::Error: Error + Send + Sync + 'static,
{
	let info = RequestInfo::from_request(&req);
	let (req, request_body) = capture_request(&state, req).await;

	let started = Instant::now();
	let outcome = AssertUnwindSafe(async move { inner.call(req).await })
		.catch_unwind()
		.await;
	let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

	match outcome {
		Ok(Ok(response)) => {
			let (response, response_body) = capture_response(&state, response).await;
			publish_activity(
				&state,
				&info,
				response.status().as_u16(),
				duration_ms,
				request_body,
				response_body,
			);
			Ok(response)
		}
		Ok(Err(error)) => {
			publish_exception(
				&state,
				&info,
				classify(&error),
				error.to_string(),
				type_name::<S::Error>(),
			);
			Err(error)
		}
		Err(panic) => {
			let message = panic_message(&*panic).unwrap_or("panic").to_string();
			publish_exception(&state, &info, classify_panic(&*panic), message, "panic");
			std::panic::resume_unwind(panic)
		}
	}
}

async fn capture_request(state: &CaptureState, req: Request<Body>) -> (Request<Body>, BodyCapture) {
	let settings = &state.settings;
	let declared = content_length(req.headers());

	if !settings.capture_bodies || !settings.is_json(req.headers()) {
		return (req, uncaptured(declared));
	}
	if declared.is_some_and(|len| len > settings.max_request_body_bytes) {
		return (req, uncaptured(declared));
	}

	let (parts, body) = req.into_parts();
	let (body, captured) = buffer_body(body, settings.max_request_body_bytes, &state.masker).await;
	(Request::from_parts(parts, body), captured)
}

async fn capture_response(
	state: &CaptureState,
	response: Response<Body>,
) -> (Response<Body>, BodyCapture) {
	let settings = &state.settings;
	let declared = content_length(response.headers());

	if !settings.capture_bodies || !settings.is_json(response.headers()) {
		return (response, uncaptured(declared));
	}
	if declared.is_some_and(|len| len > settings.max_response_body_bytes) {
		return (response, uncaptured(declared));
	}

	let (parts, body) = response.into_parts();
	let (body, captured) = buffer_body(body, settings.max_response_body_bytes, &state.masker).await;
	(Response::from_parts(parts, body), captured)
}

fn uncaptured(declared: Option<usize>) -> BodyCapture {
	BodyCapture {
		size: declared.unwrap_or(0),
		preview: None,
	}
}

/// Buffer at most `cap` bytes of `body` and hand back an equivalent body.
///
/// Reading stops at the first frame that crosses `cap`: the frames read so far
/// are replayed ahead of the unread remainder and no preview is produced. The
/// recorded size is then the number of bytes read, not the full length. A read
/// error is replayed after the buffered frames.
async fn buffer_body(body: Body, cap: usize, masker: &Masker) -> (Body, BodyCapture) {
	let mut stream = body.into_data_stream();
	let mut chunks: Vec<Bytes> = Vec::new();
	let mut size = 0usize;

	while let Some(frame) = stream.next().await {
		match frame {
			Ok(chunk) => {
				size += chunk.len();
				chunks.push(chunk);
				if size > cap {
					let replay = futures::stream::iter(chunks.into_iter().map(Ok));
					let captured = BodyCapture {
						size,
						preview: None,
					};
					return (Body::from_stream(replay.chain(stream)), captured);
				}
			}
			Err(e) => {
				debug!(error = %e, "failed to buffer body for audit capture");
				let replay = futures::stream::iter(chunks.into_iter().map(Ok))
					.chain(futures::stream::once(futures::future::ready(Err(e))));
				let captured = BodyCapture {
					size,
					preview: None,
				};
				return (Body::from_stream(replay), captured);
			}
		}
	}

	let bytes = concat(chunks, size);
	let captured = BodyCapture {
		size,
		preview: masker.mask_json_bytes(&bytes),
	};
	(Body::from(bytes), captured)
}

fn concat(mut chunks: Vec<Bytes>, size: usize) -> Bytes {
	if chunks.len() == 1 {
		return chunks.remove(0);
	}
	let mut buf = Vec::with_capacity(size);
	for chunk in &chunks {
		buf.extend_from_slice(chunk);
	}
	Bytes::from(buf)
}

fn publish_activity(
	state: &CaptureState,
	info: &RequestInfo,
	status_code: u16,
	duration_ms: u64,
	request: BodyCapture,
	response: BodyCapture,
) {
	let event = info
		.event(AuditEventType::Activity)
		.payload(json!({
			"path": info.path,
			"method": info.method,
			"status_code": status_code,
			"duration_ms": duration_ms,
			"capture_mode": state.settings.capture_bodies,
			"request_size": request.size,
			"response_size": response.size,
			"request_preview": request.preview,
			"response_preview": response.preview,
		}))
		.build();

	if let Err(e) = state.publisher.publish(event, &info.scope) {
		debug!(error = %e, path = %info.path, "audit activity not published");
	}
}

fn publish_exception(
	state: &CaptureState,
	info: &RequestInfo,
	severity: AuditSeverity,
	error: String,
	error_type: &str,
) {
	if severity < state.settings.min_exception_severity {
		debug!(
			%severity,
			path = %info.path,
			error = %error,
			"request failure below audit threshold"
		);
		return;
	}

	let event = info
		.event(AuditEventType::Exception)
		.severity(severity)
		.payload(json!({
			"area": EXCEPTION_AREA,
			"path": info.path,
			"method": info.method,
			"error": error,
			"error_type": error_type,
		}))
		.build();

	if let Err(e) = state.publisher.publish(event, &info.scope) {
		debug!(error = %e, path = %info.path, "audit exception not published");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_scope_ids_fall_back_to_trace_id() {
		let mut req = Request::builder()
			.uri("/api/items")
			.header("x-request-id", "req-7")
			.body(Body::empty())
			.unwrap();
		req.extensions_mut()
			.insert(AuditScope::default().with_correlation_id("  "));

		let info = RequestInfo::from_request(&req);
		assert_eq!(info.scope.correlation_id.as_deref(), Some("req-7"));
		assert_eq!(info.scope.request_id.as_deref(), Some("req-7"));
	}

	#[test]
	fn scope_ids_win_over_trace_id() {
		let mut req = Request::builder()
			.uri("/api/items")
			.header("x-request-id", "req-7")
			.body(Body::empty())
			.unwrap();
		req.extensions_mut().insert(
			AuditScope::default()
				.with_correlation_id("corr-1")
				.with_request_id("inner-1"),
		);

		let info = RequestInfo::from_request(&req);
		assert_eq!(info.scope.correlation_id.as_deref(), Some("corr-1"));
		assert_eq!(info.scope.request_id.as_deref(), Some("inner-1"));
	}

	#[tokio::test]
	async fn oversized_buffered_body_keeps_bytes_without_preview() {
		let masker = Masker::default();
		let (body, captured) = buffer_body(Body::from(r#"{"password":"x"}"#), 4, &masker).await;

		assert_eq!(captured.size, 16);
		assert!(captured.preview.is_none());
		let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
		assert_eq!(&bytes[..], br#"{"password":"x"}"#);
	}

	fn chunked(chunks: usize, chunk_len: usize) -> Body {
		let frames: Vec<Result<Bytes, std::convert::Infallible>> = (0..chunks)
			.map(|i| Ok(Bytes::from(vec![b'a' + (i % 26) as u8; chunk_len])))
			.collect();
		Body::from_stream(futures::stream::iter(frames))
	}

	#[tokio::test]
	async fn unsized_body_stops_reading_past_cap() {
		let masker = Masker::default();
		let (body, captured) = buffer_body(chunked(50, 1024), 8, &masker).await;

		assert_eq!(captured.size, 1024);
		assert!(captured.preview.is_none());

		let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
		assert_eq!(bytes.len(), 50 * 1024);
		assert!(bytes[..1024].iter().all(|b| *b == b'a'));
		assert!(bytes[49 * 1024..].iter().all(|b| *b == b'a' + 23));
	}

	#[tokio::test]
	async fn multi_frame_body_within_cap_is_previewed() {
		let frames: Vec<Result<Bytes, std::convert::Infallible>> = vec![
			Ok(Bytes::from_static(b"{\"pin\":")),
			Ok(Bytes::from_static(b"1234}")),
		];
		let body = Body::from_stream(futures::stream::iter(frames));
		let (body, captured) = buffer_body(body, 64, &Masker::default()).await;

		assert_eq!(captured.size, 12);
		assert_eq!(captured.preview, Some(json!({"pin": "****"})));
		let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
		assert_eq!(&bytes[..], b"{\"pin\":1234}");
	}

	#[tokio::test]
	async fn invalid_json_has_null_preview() {
		let masker = Masker::default();
		let (_, captured) = buffer_body(Body::from("not json"), 1024, &masker).await;
		assert_eq!(captured.size, 8);
		assert!(captured.preview.is_none());
	}
}
