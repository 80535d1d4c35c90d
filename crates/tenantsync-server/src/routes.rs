//! Request routing and handlers
//!
//! | Route | Method | Operation |
//! |-------|--------|-----------|
//! | `/sync/initialize` | POST | Align, migrate and plan |
//! | `/sync/pull?key=` | GET | Download one file |
//! | `/sync/push` | POST | Merge a record batch |
//! | `/sync/upload?key=` | POST | Replace one file |
//! | `/health` | GET | Liveness |
//! | `/metrics` | GET | Prometheus text |

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, ETAG};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tenantsync_core::domain::{is_database_file, LocalFileState, PushBatch, SyncAction};
use tracing::{debug, error, warn};

use crate::context::{base_hash, query_param, tenant_context};
use crate::error::ApiError;
use crate::server::AppState;

type HttpResponse = Response<Full<Bytes>>;

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Health,
    Metrics,
    Initialize,
    Pull,
    Push,
    Upload,
    WrongMethod(&'static str),
    Unknown,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Self {
        let (expected, route) = match path {
            "/health" => (Method::GET, Self::Health),
            "/metrics" => (Method::GET, Self::Metrics),
            "/sync/initialize" => (Method::POST, Self::Initialize),
            "/sync/pull" => (Method::GET, Self::Pull),
            "/sync/push" => (Method::POST, Self::Push),
            "/sync/upload" => (Method::POST, Self::Upload),
            _ => return Self::Unknown,
        };
        if *method == expected {
            route
        } else {
            Self::WrongMethod(route.label())
        }
    }

    /// Value of the `route` metric label
    fn label(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Metrics => "metrics",
            Self::Initialize => "initialize",
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Upload => "upload",
            Self::WrongMethod(label) => label,
            Self::Unknown => "unknown",
        }
    }
}

/// Entry point for every request
pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible> {
    let route = Route::resolve(req.method(), req.uri().path());
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match dispatch(route, req, &state).await {
        Ok(response) => response,
        Err(err) => {
            if err.status.is_server_error() {
                error!(method = %method, path = %path, kind = err.kind, message = %err.message, "Request failed");
            } else if err.status == StatusCode::CONFLICT {
                warn!(method = %method, path = %path, kind = err.kind, message = %err.message, "Request conflicted");
            } else {
                debug!(method = %method, path = %path, kind = err.kind, message = %err.message, "Request rejected");
            }
            err.into_response()
        }
    };

    state
        .metrics
        .record_http_request(route.label(), response.status().as_u16());
    debug!(method = %method, path = %path, status = response.status().as_u16(), "Request handled");
    Ok(response)
}

async fn dispatch(
    route: Route,
    req: Request<Incoming>,
    state: &AppState,
) -> Result<HttpResponse, ApiError> {
    match route {
        Route::Health => text_response(StatusCode::OK, "text/plain", Bytes::from_static(b"ok")),
        Route::Metrics => {
            let body = state
                .metrics
                .encode()
                .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {e}")))?;
            text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                Bytes::from(body),
            )
        }
        Route::Initialize => initialize(req, state).await,
        Route::Pull => pull(req, state).await,
        Route::Push => push(req, state).await,
        Route::Upload => upload(req, state).await,
        Route::WrongMethod(_) => Err(ApiError::method_not_allowed()),
        Route::Unknown => Err(ApiError::not_found(format!("no route for {}", req.uri().path()))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct InitializeRequest {
    #[serde(default)]
    local_files: Vec<LocalFileState>,
}

/// Successful response: a status word followed by the report fields
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    status: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

async fn initialize(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse, ApiError> {
    let (parts, body) = req.into_parts();
    let ctx = tenant_context(&parts.headers)?;
    let body = read_body(body, state.max_body_bytes).await?;

    let request: InitializeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InitializeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid initialize request: {e}")))?
    };

    let report = state.track(
        "initialize",
        state.orchestrator.initialize(&ctx, &request.local_files).await,
    )?;

    let applied: usize = report
        .plan
        .iter()
        .map(|action| match action {
            SyncAction::MigrateSchema { statements, .. } => statements.len(),
            _ => 0,
        })
        .sum();
    state
        .metrics
        .record_schema_statements("applied", applied as u64);
    state
        .metrics
        .record_schema_statements("warning", report.warnings.len() as u64);

    json_response(&Envelope {
        status: "cloud_ready",
        body: &report,
    })
}

async fn pull(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse, ApiError> {
    let ctx = tenant_context(req.headers())?;
    let key = required_key(&req)?;

    let pulled = state.track("pull", state.orchestrator.pull(&ctx, &key).await)?;

    let content_type = if is_database_file(&pulled.key) {
        "application/x-sqlite3"
    } else {
        "application/octet-stream"
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(ETAG, format!("\"{}\"", pulled.content_hash))
        .body(Full::new(Bytes::from(pulled.bytes)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

async fn push(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse, ApiError> {
    let (parts, body) = req.into_parts();
    let ctx = tenant_context(&parts.headers)?;
    let body = read_body(body, state.max_body_bytes).await?;
    let batch: PushBatch = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid push batch: {e}")))?;

    let report = state.track("push", state.orchestrator.push(&ctx, &batch).await)?;
    state
        .metrics
        .record_merge(report.merged_records, report.stale_records);

    json_response(&Envelope {
        status: "push_success",
        body: &report,
    })
}

async fn upload(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse, ApiError> {
    let (parts, body) = req.into_parts();
    let ctx = tenant_context(&parts.headers)?;
    let key = query_param(parts.uri.query(), "key")
        .ok_or_else(|| ApiError::bad_request("missing `key` query parameter"))?;
    let base = base_hash(&parts.headers)?;
    let body = read_body(body, state.max_body_bytes).await?;

    let report = state.track(
        "upload",
        state
            .orchestrator
            .upload(&ctx, &key, body.to_vec(), base.as_deref())
            .await,
    )?;

    json_response(&Envelope {
        status: "ok",
        body: &report,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn required_key(req: &Request<Incoming>) -> Result<String, ApiError> {
    query_param(req.uri().query(), "key")
        .ok_or_else(|| ApiError::bad_request("missing `key` query parameter"))
}

async fn read_body(body: Incoming, limit: usize) -> Result<Bytes, ApiError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::payload_too_large(limit))
        }
        Err(e) => Err(ApiError::bad_request(format!(
            "failed to read request body: {e}"
        ))),
    }
}

fn json_response<T: Serialize>(value: &T) -> Result<HttpResponse, ApiError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| ApiError::internal(format!("failed to encode response: {e}")))?;
    text_response(StatusCode::OK, "application/json", Bytes::from(body))
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Result<HttpResponse, ApiError> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body))
        .map_err(|e| ApiError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_resolution() {
        assert_eq!(Route::resolve(&Method::POST, "/sync/push"), Route::Push);
        assert_eq!(Route::resolve(&Method::GET, "/sync/pull"), Route::Pull);
        assert_eq!(
            Route::resolve(&Method::GET, "/sync/push"),
            Route::WrongMethod("push")
        );
        assert_eq!(Route::resolve(&Method::GET, "/sync"), Route::Unknown);
        assert_eq!(Route::resolve(&Method::GET, "/sync/push").label(), "push");
    }

    #[test]
    fn test_envelope_flattens_report() {
        let report = tenantsync_core::domain::UploadReport {
            key: "acme/suc_1/caja.sqlite".into(),
            content_hash: "abc".into(),
        };
        let value = serde_json::to_value(Envelope {
            status: "ok",
            body: &report,
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "ok", "key": "acme/suc_1/caja.sqlite", "content_hash": "abc"})
        );
    }
}
