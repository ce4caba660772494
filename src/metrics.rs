//! Prometheus-compatible metrics endpoint
//!
//! Exposes lag compensation counters in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for a lag compensator and its host loop
#[derive(Debug)]
pub struct Metrics {
    // Snapshot store
    pub snapshots_recorded: AtomicU64,
    pub snapshots_rejected: AtomicU64,
    pub snapshots_buffered: AtomicU64,
    pub oldest_snapshot_age_ms: AtomicU64,

    // Rewinds
    pub rewinds_total: AtomicU64,
    pub rewinds_latency_clamped: AtomicU64,
    pub rewinds_history_clamped: AtomicU64,
    pub last_applied_latency_ms: AtomicU64,

    // Hit validation
    pub hits_confirmed: AtomicU64,
    pub hits_missed: AtomicU64,
    pub hit_errors: AtomicU64,
    pub claims_dropped: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation (VecDeque for O(1) pop_front)
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            snapshots_recorded: AtomicU64::new(0),
            snapshots_rejected: AtomicU64::new(0),
            snapshots_buffered: AtomicU64::new(0),
            oldest_snapshot_age_ms: AtomicU64::new(0),
            rewinds_total: AtomicU64::new(0),
            rewinds_latency_clamped: AtomicU64::new(0),
            rewinds_history_clamped: AtomicU64::new(0),
            last_applied_latency_ms: AtomicU64::new(0),
            hits_confirmed: AtomicU64::new(0),
            hits_missed: AtomicU64::new(0),
            hit_errors: AtomicU64::new(0),
            claims_dropped: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);

        // Keep last 1000 samples
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Snapshot store
        metric!("lagcomp_snapshots_recorded_total", "Snapshots accepted into the history buffer", "counter",
            self.snapshots_recorded.load(Ordering::Relaxed));
        metric!("lagcomp_snapshots_rejected_total", "Out-of-order snapshots rejected", "counter",
            self.snapshots_rejected.load(Ordering::Relaxed));
        metric!("lagcomp_snapshots_buffered", "Snapshots currently buffered", "gauge",
            self.snapshots_buffered.load(Ordering::Relaxed));
        metric!("lagcomp_oldest_snapshot_age_milliseconds", "Age of the oldest buffered snapshot", "gauge",
            self.oldest_snapshot_age_ms.load(Ordering::Relaxed));

        // Rewinds
        metric!("lagcomp_rewinds_total", "Rewind requests served", "counter",
            self.rewinds_total.load(Ordering::Relaxed));
        metric!("lagcomp_rewinds_latency_clamped_total", "Rewinds whose latency was clamped into bounds", "counter",
            self.rewinds_latency_clamped.load(Ordering::Relaxed));
        metric!("lagcomp_rewinds_history_clamped_total", "Rewinds targeting time outside buffered history", "counter",
            self.rewinds_history_clamped.load(Ordering::Relaxed));
        metric!("lagcomp_last_applied_latency_milliseconds", "Latency applied by the most recent rewind", "gauge",
            self.last_applied_latency_ms.load(Ordering::Relaxed));

        // Hits
        metric!("lagcomp_hits_confirmed_total", "Hit claims consistent with history", "counter",
            self.hits_confirmed.load(Ordering::Relaxed));
        metric!("lagcomp_hits_missed_total", "Hit claims outside the hit radius", "counter",
            self.hits_missed.load(Ordering::Relaxed));
        metric!("lagcomp_hit_errors_total", "Hit claims failing with a structural error", "counter",
            self.hit_errors.load(Ordering::Relaxed));
        metric!("lagcomp_claims_dropped_total", "Hit claims dropped because the queue was full", "counter",
            self.claims_dropped.load(Ordering::Relaxed));

        // Tick timing
        metric!("lagcomp_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("lagcomp_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("lagcomp_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("lagcomp_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("lagcomp_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("lagcomp_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let value = json!({
            "snapshots": {
                "recorded": self.snapshots_recorded.load(Ordering::Relaxed),
                "rejected": self.snapshots_rejected.load(Ordering::Relaxed),
                "buffered": self.snapshots_buffered.load(Ordering::Relaxed),
                "oldest_age_ms": self.oldest_snapshot_age_ms.load(Ordering::Relaxed),
            },
            "rewinds": {
                "total": self.rewinds_total.load(Ordering::Relaxed),
                "latency_clamped": self.rewinds_latency_clamped.load(Ordering::Relaxed),
                "history_clamped": self.rewinds_history_clamped.load(Ordering::Relaxed),
                "last_applied_latency_ms": self.last_applied_latency_ms.load(Ordering::Relaxed),
            },
            "hits": {
                "confirmed": self.hits_confirmed.load(Ordering::Relaxed),
                "missed": self.hits_missed.load(Ordering::Relaxed),
                "errors": self.hit_errors.load(Ordering::Relaxed),
                "dropped": self.claims_dropped.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
                "uptime_seconds": self.uptime_seconds(),
            },
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    serve_metrics(listener, metrics).await
}

/// Serve metrics requests on an already bound listener
pub async fn serve_metrics(listener: TcpListener, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&request, &metrics);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn route(request: &str, metrics: &Metrics) -> String {
    // JSON routes first: "/metrics/json" also starts with "/metrics"
    if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        http_ok("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_ok("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        http_ok("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

fn http_ok(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}
