use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::state::AppState;

/// HTTP-level counters. Execution statistics live in [`crate::stats::Stats`].
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
    pub admission_rejected: AtomicU64,
    pub deadline_exceeded: AtomicU64,
    pub canceled: AtomicU64,
}

fn push_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    body.push_str(&format!(
        "# HELP {name} {help}\n\
         # TYPE {name} {kind}\n\
         {name} {value}\n"
    ));
}

pub fn render_metrics(st: &AppState) -> String {
    let m = &st.metrics;
    let snap = st.stats.snapshot();
    let mut body = String::new();

    push_metric(
        &mut body,
        "fnserve_http_requests_total",
        "counter",
        "Total HTTP requests handled.",
        m.requests_total.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_http_requests_inflight",
        "gauge",
        "Currently in-flight HTTP requests.",
        m.requests_inflight.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_http_responses_2xx",
        "counter",
        "Total 2xx responses.",
        m.status_2xx.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_http_responses_4xx",
        "counter",
        "Total 4xx responses.",
        m.status_4xx.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_http_responses_5xx",
        "counter",
        "Total 5xx responses.",
        m.status_5xx.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_admission_capacity",
        "gauge",
        "Maximum concurrent function executions.",
        st.admission.capacity() as u64,
    );
    push_metric(
        &mut body,
        "fnserve_admission_in_flight",
        "gauge",
        "Execution slots currently held.",
        st.admission.in_flight() as u64,
    );
    push_metric(
        &mut body,
        "fnserve_admission_rejected_total",
        "counter",
        "Invocations rejected because every slot was taken.",
        m.admission_rejected.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_invocations_active",
        "gauge",
        "Invocations admitted and not yet completed.",
        snap.active_requests,
    );
    push_metric(
        &mut body,
        "fnserve_invocations_total",
        "counter",
        "Invocations admitted.",
        snap.total_requests,
    );
    push_metric(
        &mut body,
        "fnserve_invocations_succeeded_total",
        "counter",
        "Invocations that completed successfully.",
        snap.success_requests,
    );
    push_metric(
        &mut body,
        "fnserve_invocations_failed_total",
        "counter",
        "Invocations that failed for any reason.",
        snap.failed_requests,
    );
    push_metric(
        &mut body,
        "fnserve_invocations_deadline_exceeded_total",
        "counter",
        "Invocations killed at their deadline.",
        m.deadline_exceeded.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_invocations_canceled_total",
        "counter",
        "Invocations killed on client disconnect or server shutdown.",
        m.canceled.load(Ordering::Relaxed),
    );
    push_metric(
        &mut body,
        "fnserve_execution_ms_total",
        "counter",
        "Summed execution time of completed invocations in milliseconds.",
        snap.total_execution_ms,
    );

    body
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    let body = render_metrics(&st);
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn stats_handler(State(st): State<AppState>) -> impl IntoResponse {
    let snap = st.stats.snapshot();
    Json(serde_json::json!({
        "active_requests": snap.active_requests,
        "total_requests": snap.total_requests,
        "success_requests": snap.success_requests,
        "failed_requests": snap.failed_requests,
        "avg_execution_ms": snap.avg_execution_ms,
    }))
}

pub async fn track_requests(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let status = resp.status().as_u16();
    if status >= 500 {
        st.metrics.status_5xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 400 {
        st.metrics.status_4xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 200 {
        st.metrics.status_2xx.fetch_add(1, Ordering::Relaxed);
    }

    Ok(resp)
}
