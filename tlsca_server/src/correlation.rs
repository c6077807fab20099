// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-call correlation.
//!
//! Each call gets a trace id taken from its `x-request-id` metadata, or a
//! fresh UUID v4 when the caller sent none or sent one we refuse to echo.
//! The id and the caller's peer address ride on a `grpc_request` span, and
//! the id is written back on the response or the error status.

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Request, Response, Status};
use tracing::Span;
use uuid::Uuid;

/// Metadata key carrying the trace id in both directions.
pub const TRACE_ID_HEADER: &str = "x-request-id";

/// Longest caller supplied trace id that is echoed back.
pub const MAX_TRACE_ID_LEN: usize = 128;

/// Whether a caller supplied trace id is safe to log and echo.
fn acceptable(trace_id: &str) -> bool {
    !trace_id.is_empty()
        && trace_id.len() <= MAX_TRACE_ID_LEN
        && trace_id.bytes().all(|b| b.is_ascii_graphic())
}

/// Trace id for `request`, generated when absent or unacceptable.
pub fn extract_or_generate<T>(request: &Request<T>) -> String {
    request
        .metadata()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| acceptable(id))
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string)
}

/// Span for one gRPC call.
pub fn request_span(trace_id: &str, service: &str, method: &str, peer: Option<&str>) -> Span {
    tracing::info_span!(
        "grpc_request",
        trace_id = %trace_id,
        service = %service,
        method = %method,
        peer = peer.unwrap_or("-"),
    )
}

fn tag(metadata: &mut MetadataMap, trace_id: &str) {
    if let Ok(value) = AsciiMetadataValue::try_from(trace_id) {
        metadata.insert(TRACE_ID_HEADER, value);
    }
}

/// Correlation state for one call.
///
/// The span is never entered here; handlers attach it to their futures with
/// [`tracing::Instrument`] or run synchronous work with [`Span::in_scope`].
#[derive(Debug, Clone)]
pub struct RequestSpan {
    trace_id: String,
    peer: Option<String>,
    span: Span,
}

/// Start correlation for `request` on `service`/`method`.
pub fn start_request_span<T>(request: &Request<T>, service: &str, method: &str) -> RequestSpan {
    let trace_id = extract_or_generate(request);
    let peer = request.remote_addr().map(|addr| addr.to_string());
    let span = request_span(&trace_id, service, method, peer.as_deref());

    span.in_scope(|| tracing::debug!("Request started"));

    RequestSpan {
        trace_id,
        peer,
        span,
    }
}

impl RequestSpan {
    /// Trace id of the call.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Remote peer address, when the transport knows it.
    #[must_use]
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// The call's span.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Wrap a successful reply.
    pub fn into_response<T>(&self, inner: T) -> Response<T> {
        let mut response = Response::new(inner);
        tag(response.metadata_mut(), &self.trace_id);
        response
    }

    /// Stamp the trace id on an error status.
    #[must_use]
    pub fn tag_status(&self, mut status: Status) -> Status {
        tag(status.metadata_mut(), &self.trace_id);
        status
    }

    /// Turn a handler result into the reply, stamped either way.
    pub fn finish<T>(
        &self,
        result: std::result::Result<T, Status>,
    ) -> std::result::Result<Response<T>, Status> {
        let ok = result.is_ok();
        self.span
            .in_scope(|| tracing::debug!(ok, "Request finished"));

        match result {
            Ok(inner) => Ok(self.into_response(inner)),
            Err(status) => Err(self.tag_status(status)),
        }
    }
}
