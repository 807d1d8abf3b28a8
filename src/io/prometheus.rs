//! Prometheus metrics HTTP endpoint
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - liveness
//! - `GET /status` - latest room status JSON
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::io::notify_channel::StatusPayload;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

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
    sum: u64,
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
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads a snapshot only; the periodic reporter owns the resetting counters.
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let snap = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_tick_metrics(&mut output, site_id, &snap);
    write_room_metrics(&mut output, site_id, &snap);
    write_actuator_metrics(&mut output, site_id, &snap);
    write_notification_metrics(&mut output, site_id, &snap);

    output
}

fn write_tick_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "childguard_ticks_total",
        "Controller ticks processed",
        MetricType::Counter,
        site,
        snap.ticks_total,
    );
    write_histogram(
        output,
        "childguard_tick_latency_us",
        "Controller tick latency in microseconds",
        site,
        &snap.tick_lat_buckets_total,
        snap.tick_latency_sum_total_us,
    );
    write_metric(
        output,
        "childguard_signal_updates_total",
        "Sensor payloads accepted",
        MetricType::Counter,
        site,
        snap.signal_updates_total,
    );
    write_metric(
        output,
        "childguard_signal_rejected_total",
        "Sensor payloads rejected as unparseable",
        MetricType::Counter,
        site,
        snap.signal_rejected_total,
    );
}

fn write_room_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    let name = "childguard_crossings_total";
    let _ = writeln!(output, "# HELP {name} Doorway crossings by person and direction");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (person, direction, val) in [
        ("adult", "entering", snap.adult_entries),
        ("adult", "exiting", snap.adult_exits),
        ("child", "entering", snap.child_entries),
        ("child", "exiting", snap.child_exits),
    ] {
        let _ = writeln!(
            output,
            "{name}{{site=\"{site}\",person=\"{person}\",direction=\"{direction}\"}} {val}"
        );
    }

    write_metric(
        output,
        "childguard_presence_resets_total",
        "Occupancy resets after the no-motion timeout",
        MetricType::Counter,
        site,
        snap.presence_resets_total,
    );
    write_metric(
        output,
        "childguard_adults",
        "Adults currently counted in the room",
        MetricType::Gauge,
        site,
        snap.adults,
    );
    write_metric(
        output,
        "childguard_children",
        "Children currently counted in the room",
        MetricType::Gauge,
        site,
        snap.children,
    );
    write_metric(
        output,
        "childguard_door_state",
        "Door state (0=free, 1=check_low, 2=check_high, 3=occupied_child, 4=occupied_adult)",
        MetricType::Gauge,
        site,
        snap.door_state,
    );
    write_metric(
        output,
        "childguard_child_alone_alerts_total",
        "Alone episodes that exceeded the alert threshold",
        MetricType::Counter,
        site,
        snap.child_alone_alerts_total,
    );
}

fn write_actuator_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "childguard_actuator_on",
        "Acknowledged appliance state (1=on)",
        MetricType::Gauge,
        site,
        u64::from(snap.actuator_on),
    );
    write_metric(
        output,
        "childguard_actuator_commands_total",
        "Actuator commands accepted by the appliance",
        MetricType::Counter,
        site,
        snap.actuator_cmds_sent,
    );
    write_metric(
        output,
        "childguard_actuator_commands_failed_total",
        "Actuator commands that failed",
        MetricType::Counter,
        site,
        snap.actuator_cmds_failed,
    );
    write_metric(
        output,
        "childguard_actuator_commands_dropped_total",
        "Actuator commands dropped due to a full queue",
        MetricType::Counter,
        site,
        snap.actuator_cmds_dropped,
    );
}

fn write_notification_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "childguard_notifications_sent_total",
        "Notifications published",
        MetricType::Counter,
        site,
        snap.notifications_sent,
    );
    write_metric(
        output,
        "childguard_notifications_dropped_total",
        "Notifications dropped due to a full queue",
        MetricType::Counter,
        site,
        snap.notifications_dropped,
    );
    write_metric(
        output,
        "childguard_status_dropped_total",
        "Status snapshots dropped due to a full queue",
        MetricType::Counter,
        site,
        snap.status_dropped,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
    status: watch::Receiver<StatusPayload>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics, &site_id, &status))
}

fn route(
    method: &Method,
    path: &str,
    metrics: &Metrics,
    site_id: &str,
    status: &watch::Receiver<StatusPayload>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(metrics, site_id);
            response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok".to_string()),
        (&Method::GET, "/status") => {
            let payload = status.borrow().clone();
            match serde_json::to_string(&payload) {
                Ok(json) => response(StatusCode::OK, "application/json", json),
                Err(e) => {
                    error!(error = %e, "status_serialize_failed");
                    response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "error".to_string())
                }
            }
        }
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

fn response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    if let Ok(value) = hyper::header::HeaderValue::from_str(content_type) {
        resp.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    resp
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    status: watch::Receiver<StatusPayload>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();
                        let status = status.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                let status = status.clone();
                                async move { handle_request(req, metrics, site_id, status).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
