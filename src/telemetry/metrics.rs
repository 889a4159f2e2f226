//! Application metrics using the metrics crate.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::auth::policy::{Action, Decision};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        });

        Self {
            handle: Some(handle.clone()),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LoginOutcome {
    Success,
    InvalidCredentials,
}

impl LoginOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LoginOutcome::Success => "success",
            LoginOutcome::InvalidCredentials => "invalid_credentials",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Error,
}

impl CacheOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Error => "error",
        }
    }
}

pub fn record_login(outcome: LoginOutcome) {
    counter!("login_attempts_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_authz_decision(action: Action, decision: &Decision) {
    counter!(
        "authorization_decisions_total",
        "action" => action.name(),
        "decision" => decision.label()
    )
    .increment(1);
}

pub fn record_cache_lookup(outcome: CacheOutcome) {
    counter!("project_cache_lookups_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_request_latency(
    method: &str,
    path: &str,
    status: u16,
    duration: std::time::Duration,
) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}
