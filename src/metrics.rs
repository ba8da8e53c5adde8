//! Prometheus metrics HTTP server.
//!
//! Exposes capture statistics in Prometheus text format, plus the running
//! display log and the decoded position track for UI consumers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::record::DisplayLog;
use crate::stats::DecoderStats;
use crate::track::PositionTrack;

/// Shared state served over HTTP.
#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<DecoderStats>,
    pub display: Arc<DisplayLog>,
    pub track: Arc<PositionTrack>,
}

/// Build the HTTP routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/calls", get(calls_handler))
        .route("/positions", get(positions_handler))
        .with_state(state)
}

/// Start the metrics HTTP server.
///
/// Runs until the listener fails.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(port: u16, state: AppState) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&state.stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

/// Statistics summary as JSON.
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.summary())
}

/// The running display log as plain text.
async fn calls_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        state.display.contents(),
    )
}

/// Decoded positions as JSON.
async fn positions_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.track.positions())
}

fn push_counter(output: &mut String, name: &str, help: &str, value: u64) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} counter\n", name));
    output.push_str(&format!("{} {}\n", name, value));
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &DecoderStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(4096);

    // Uptime
    output.push_str("# HELP dsc_uptime_seconds Time since capture started\n");
    output.push_str("# TYPE dsc_uptime_seconds gauge\n");
    output.push_str(&format!("dsc_uptime_seconds {:.3}\n", summary.elapsed_secs));

    push_counter(
        &mut output,
        "dsc_bytes_received_total",
        "Raw bytes received from the link",
        summary.bytes_received,
    );
    push_counter(
        &mut output,
        "dsc_bytes_discarded_total",
        "Bytes dropped after a frame by the trailing-text rule",
        summary.bytes_discarded,
    );
    push_counter(
        &mut output,
        "dsc_frames_total",
        "Frames extracted and decoded",
        summary.frames_decoded,
    );
    push_counter(
        &mut output,
        "dsc_untyped_frames_total",
        "Frames without a call type",
        summary.untyped_frames,
    );
    push_counter(
        &mut output,
        "dsc_files_written_total",
        "Call files created",
        summary.files_written,
    );
    push_counter(
        &mut output,
        "dsc_duplicate_files_total",
        "Call files skipped because the name already existed",
        summary.duplicate_files,
    );
    push_counter(
        &mut output,
        "dsc_write_failures_total",
        "Call file writes that failed",
        summary.write_failures,
    );
    push_counter(
        &mut output,
        "dsc_positions_published_total",
        "Position updates published",
        summary.positions_published,
    );
    push_counter(
        &mut output,
        "dsc_positions_malformed_total",
        "Pos fields without a lat,long pair",
        summary.positions_malformed,
    );

    // Calls by type
    output.push_str("# HELP dsc_calls_by_type_total Frames broken down by call type\n");
    output.push_str("# TYPE dsc_calls_by_type_total counter\n");
    for (call_type, count) in &summary.calls_by_type {
        output.push_str(&format!(
            "dsc_calls_by_type_total{{type=\"{}\"}} {}\n",
            call_type, count
        ));
    }

    // Frame length distribution
    if let Some(ref p) = summary.frame_percentiles {
        output.push_str("# HELP dsc_frame_bytes Frame length distribution in bytes\n");
        output.push_str("# TYPE dsc_frame_bytes summary\n");
        output.push_str(&format!("dsc_frame_bytes{{quantile=\"0.5\"}} {}\n", p.p50));
        output.push_str(&format!("dsc_frame_bytes{{quantile=\"0.9\"}} {}\n", p.p90));
        output.push_str(&format!("dsc_frame_bytes{{quantile=\"0.99\"}} {}\n", p.p99));
        output.push_str(&format!("dsc_frame_bytes_count {}\n", summary.frames_decoded));
    }

    output
}
