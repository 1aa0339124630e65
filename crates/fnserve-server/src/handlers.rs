use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use fnserve_common::context::new_id;
use fnserve_common::{InvocationContext, TraceInfo, FORWARDED_HEADERS};
use fnserve_runtime::{create_runtime, InvokeError};

use crate::admission::AdmissionSlot;
use crate::registry::FunctionInfo;
use crate::state::AppState;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const PARENT_SPAN_HEADER: &str = "x-parent-span";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn list_functions(State(st): State<AppState>) -> impl IntoResponse {
    let functions: Vec<&FunctionInfo> = st.registry.iter().collect();
    Json(json!(functions))
}

/// First value wins for repeated query keys.
pub fn first_values(pairs: &[(String, String)]) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (k, v) in pairs {
        params.entry(k.clone()).or_insert_with(|| v.clone());
    }
    params
}

pub fn build_invocation_context(
    headers: &HeaderMap,
    query: &[(String, String)],
    deadline: Duration,
) -> InvocationContext {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let mut env = HashMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(v) = header(name).filter(|v| !v.is_empty()) {
            env.insert(name.to_string(), v.to_string());
        }
    }

    InvocationContext::new(new_id(), deadline)
        .with_parameters(first_values(query))
        .with_env(env)
        .with_tracing(TraceInfo::inherit(
            header(TRACE_ID_HEADER),
            header(PARENT_SPAN_HEADER),
        ))
}

fn parse_query(uri: &Uri) -> Vec<(String, String)> {
    match Query::<Vec<(String, String)>>::try_from_uri(uri) {
        Ok(Query(pairs)) => pairs,
        Err(e) => {
            tracing::debug!(error=%e, "ignoring malformed query string");
            Vec::new()
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn with_ids(mut resp: Response, request_id: &str, trace_id: &str) -> Response {
    for (name, value) in [(REQUEST_ID_HEADER, request_id), (TRACE_ID_HEADER, trace_id)] {
        if let Ok(v) = HeaderValue::from_str(value) {
            resp.headers_mut()
                .insert(HeaderName::from_static(name), v);
        }
    }
    resp
}

/// `POST /:name`: run one function and return its raw output.
pub async fn invoke(
    State(st): State<AppState>,
    Path(name): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(function) = st.registry.get(&name).cloned() else {
        return error_response(StatusCode::NOT_FOUND, "function not found");
    };

    let Some(slot) = st.admission.try_acquire() else {
        st.metrics.admission_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(function=%name, capacity=st.admission.capacity(), "too many requests, rejecting");
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            &InvokeError::AdmissionDenied.to_string(),
        );
    };

    let started_at = Instant::now();
    st.stats.record_start();

    let ctx = build_invocation_context(&headers, &parse_query(&uri), st.config.request_timeout);
    let request_id = ctx.request_id.clone();
    let trace_id = ctx.tracing.trace_id.clone();

    let event = match axum::body::to_bytes(body, st.config.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => {
            st.stats.record_failure(started_at);
            drop(slot);
            tracing::warn!(request_id=%request_id, function=%name, error=%e, "failed to read request body");
            return with_ids(
                error_response(StatusCode::BAD_REQUEST, "invalid request body"),
                &request_id,
                &trace_id,
            );
        }
    };

    // Dropping this handler (client went away) cancels the invocation; the
    // spawned task still kills the process, records stats and frees the slot.
    let cancel = st.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let task = tokio::spawn(run_invocation(
        st.clone(),
        function,
        event,
        ctx,
        cancel,
        slot,
        started_at,
    ));
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            st.stats.record_failure(started_at);
            Err(InvokeError::Io(std::io::Error::other(e)))
        }
    };

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            tracing::info!(request_id=%request_id, trace_id=%trace_id, function=%name, elapsed_ms, "invocation succeeded");
            let resp = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                output,
            )
                .into_response();
            with_ids(resp, &request_id, &trace_id)
        }
        Err(e) => {
            tracing::warn!(request_id=%request_id, trace_id=%trace_id, function=%name, kind=e.kind(), error=%e, elapsed_ms, "invocation failed");
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            with_ids(error_response(status, &e.to_string()), &request_id, &trace_id)
        }
    }
}

async fn run_invocation(
    st: AppState,
    function: FunctionInfo,
    event: Bytes,
    ctx: InvocationContext,
    cancel: CancellationToken,
    slot: AdmissionSlot,
    started_at: Instant,
) -> Result<Vec<u8>, InvokeError> {
    let runtime = create_runtime(function.runtime, &st.config.runtime);
    let result = runtime.execute(&function.path, &event, &ctx, &cancel).await;

    // Runs to completion even when the handler was dropped, so every
    // outcome is counted here.
    match &result {
        Ok(_) => st.stats.record_success(started_at),
        Err(e) => {
            st.stats.record_failure(started_at);
            match e {
                InvokeError::DeadlineExceeded(_) => {
                    st.metrics.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
                }
                InvokeError::Canceled => {
                    st.metrics.canceled.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(request_id=%ctx.request_id, function=%function.name, "invocation canceled");
                }
                _ => {}
            }
        }
    }
    drop(slot);
    result
}
