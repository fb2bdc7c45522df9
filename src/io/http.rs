//! HTTP display and control endpoint
//!
//! Read-only JSON views of the event log, region set and current position,
//! Prometheus text metrics at /metrics, and region add/remove routed through
//! the monitor's command channel. Uses hyper for the HTTP server.

use crate::domain::types::{Coordinate, GeoRegion, Position, RegionId};
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::event_log::EventLogReader;
use crate::services::monitor::{CommandError, MonitorHandle};
use crate::services::registry::{RegistryError, RegistryView};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Everything the endpoint reads from or sends to
pub struct HttpState {
    pub site_id: String,
    pub events: EventLogReader,
    pub regions: RegistryView,
    pub position: watch::Receiver<Option<Position>>,
    pub metrics: Arc<Metrics>,
    pub handle: MonitorHandle,
    pub default_radius_m: f64,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", avg * count);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, event_log_size: usize, site_id: &str) -> String {
    let summary = metrics.report(event_log_size);
    let mut output = String::with_capacity(4096);

    write_signal_metrics(&mut output, site_id, &summary);
    write_transition_metrics(&mut output, site_id, &summary);
    write_drop_metrics(&mut output, site_id, &summary);

    output
}

fn write_signal_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_signals_total",
        "Total location signals processed",
        MetricType::Counter,
        site,
        summary.signals_total,
    );
    write_histogram(
        output,
        "geofence_signal_latency_us",
        "Signal handling latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.avg_latency_us,
    );
    write_metric(
        output,
        "geofence_signal_latency_p99_us",
        "99th percentile signal handling latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "geofence_position_updates_total",
        "Position fixes applied",
        MetricType::Counter,
        site,
        summary.position_updates_total,
    );
    write_metric(
        output,
        "geofence_location_errors_total",
        "Service-level location errors",
        MetricType::Counter,
        site,
        summary.location_errors_total,
    );
}

fn write_transition_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_entered_total",
        "Region entries recorded",
        MetricType::Counter,
        site,
        summary.entered_total,
    );
    write_metric(
        output,
        "geofence_exited_total",
        "Region exits recorded",
        MetricType::Counter,
        site,
        summary.exited_total,
    );
    write_metric(
        output,
        "geofence_monitoring_failures_total",
        "Monitoring failures recorded",
        MetricType::Counter,
        site,
        summary.failures_total,
    );
    write_metric(
        output,
        "geofence_unknown_region_total",
        "Transitions dropped for regions not monitored",
        MetricType::Counter,
        site,
        summary.unknown_region_total,
    );
    write_metric(
        output,
        "geofence_regions_monitored",
        "Regions currently monitored",
        MetricType::Gauge,
        site,
        summary.regions_monitored,
    );
    write_metric(
        output,
        "geofence_event_log_size",
        "Events held in the event log",
        MetricType::Gauge,
        site,
        summary.event_log_size as u64,
    );
}

fn write_drop_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_signals_dropped_total",
        "Signals dropped due to channel full",
        MetricType::Counter,
        site,
        summary.signals_dropped,
    );
    write_metric(
        output,
        "geofence_render_dropped_total",
        "Render requests dropped due to channel full",
        MetricType::Counter,
        site,
        summary.render_dropped,
    );
    write_metric(
        output,
        "geofence_region_rejections_total",
        "Region add requests rejected",
        MetricType::Counter,
        site,
        summary.region_rejections_total,
    );
}

/// Body of `POST /regions`
#[derive(Debug, Deserialize)]
struct AddRegionRequest {
    id: Option<String>,
    lat: f64,
    lon: f64,
    radius_m: Option<f64>,
}

/// Build a region from a `POST /regions` body
///
/// Without an `id` the identifier is derived from the center coordinate.
pub fn parse_add_region(body: &[u8], default_radius_m: f64) -> Result<GeoRegion, String> {
    let req: AddRegionRequest = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let center = Coordinate::new(req.lat, req.lon);
    let radius_m = req.radius_m.unwrap_or(default_radius_m);
    let region = match req.id {
        Some(id) => GeoRegion::new(id, center, radius_m),
        None => GeoRegion::at_center(center, radius_m),
    };
    region.map_err(|e| e.to_string())
}

/// HTTP status for a failed region command
pub fn status_for(err: &CommandError) -> StatusCode {
    match err {
        CommandError::Registry(RegistryError::CapacityExceeded { .. }) => StatusCode::CONFLICT,
        CommandError::Registry(RegistryError::DuplicateIdentifier(_)) => StatusCode::CONFLICT,
        CommandError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
        CommandError::Registry(RegistryError::MonitoringUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CommandError::Registry(RegistryError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
        CommandError::MonitorStopped => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Region id from a percent-encoded path segment
///
/// None if the decoded bytes are not UTF-8.
pub fn region_id_from_path(segment: &str) -> Option<RegionId> {
    percent_decode_str(segment).decode_utf8().ok().map(|id| RegionId::from(id.into_owned()))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    ok: bool,
    error: &'a str,
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(body)))
            .expect("static response should not fail"),
        Err(e) => {
            error!(error = %e, "http_json_encode_failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn error_response(status: StatusCode, error: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { ok: false, error })
}

fn command_response(result: Result<(), CommandError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "ok": true })),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

/// Handle HTTP requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<HttpState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => {
            let body =
                format_prometheus_metrics(&state.metrics, state.events.count(), &state.site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        (&Method::GET, "/events") => json_response(StatusCode::OK, &state.events.snapshot()),
        (&Method::GET, p) if p.starts_with("/events/") => {
            match p["/events/".len()..].parse::<usize>() {
                Ok(index) => match state.events.event_at(index) {
                    Ok(event) => json_response(StatusCode::OK, &event),
                    Err(e) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
                },
                Err(_) => error_response(StatusCode::BAD_REQUEST, "invalid event index"),
            }
        }
        (&Method::GET, "/regions") => json_response(StatusCode::OK, &state.regions.list()),
        (&Method::GET, "/position") => {
            let position = *state.position.borrow();
            json_response(StatusCode::OK, &position)
        }
        (&Method::POST, "/regions") => match req.into_body().collect().await {
            Ok(collected) => {
                match parse_add_region(&collected.to_bytes(), state.default_radius_m) {
                    Ok(region) => {
                        let id = region.id().clone();
                        let result = state.handle.add_region(region).await;
                        info!(region = %id, ok = %result.is_ok(), "http_add_region");
                        command_response(result)
                    }
                    Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
                }
            }
            Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        },
        (&Method::GET, p) if p.starts_with("/regions/") => {
            match region_id_from_path(&p["/regions/".len()..]) {
                Some(id) => match state.regions.get(&id) {
                    Some(region) => json_response(StatusCode::OK, &region),
                    None => {
                        error_response(StatusCode::NOT_FOUND, &format!("region {id} not found"))
                    }
                },
                None => error_response(StatusCode::BAD_REQUEST, "invalid region id"),
            }
        }
        (&Method::DELETE, p) if p.starts_with("/regions/") => {
            match region_id_from_path(&p["/regions/".len()..]) {
                Some(id) => {
                    let result = state.handle.remove_region(id.clone()).await;
                    info!(region = %id, ok = %result.is_ok(), "http_remove_region");
                    command_response(result)
                }
                None => error_response(StatusCode::BAD_REQUEST, "invalid region id"),
            }
        }
        // CORS preflight for region control
        (&Method::OPTIONS, p) if p.starts_with("/regions") => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Start the HTTP server
pub async fn start_http_server(
    port: u16,
    state: Arc<HttpState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, site = %state.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
