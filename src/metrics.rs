//! Prometheus-compatible metrics endpoint
//!
//! Exposes boundary sync and comfort metrics in Prometheus text format and
//! as JSON. Served only when a metrics port is configured.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Rolling window used for tick percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the sync service
#[derive(Debug)]
pub struct Metrics {
    // Discovery
    pub advertisements_sent: AtomicU64,

    // Control channel
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,

    // Boundary frames
    pub frames_received: AtomicU64,
    pub frames_malformed: AtomicU64,
    pub frames_invalid_pose: AtomicU64,
    pub frames_debounced: AtomicU64,
    pub boundary_commits: AtomicU64,
    pub boundary_resets: AtomicU64,
    pub commit_failures: AtomicU64,

    // Comfort tick timing (microseconds)
    pub comfort_ticks: AtomicU64,
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    // Comfort interventions
    pub auto_turn_activations: AtomicU64,
    pub ratchet_steps: AtomicU64,

    start_time: Instant,

    #[cfg_attr(not(feature = "metrics_extended"), allow(dead_code))]
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            advertisements_sent: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            frames_invalid_pose: AtomicU64::new(0),
            frames_debounced: AtomicU64::new(0),
            boundary_commits: AtomicU64::new(0),
            boundary_resets: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            comfort_ticks: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            auto_turn_activations: AtomicU64::new(0),
            ratchet_steps: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a comfort tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.comfort_ticks.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics_extended")]
        self.update_percentiles(us);
    }

    #[cfg(feature = "metrics_extended")]
    fn update_percentiles(&self, us: u64) {
        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
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

        metric!("playspace_advertisements_sent_total", "Discovery datagrams sent", "counter",
            self.advertisements_sent.load(Ordering::Relaxed));

        metric!("playspace_connections_accepted_total", "Control channel connections accepted", "counter",
            self.connections_accepted.load(Ordering::Relaxed));
        metric!("playspace_connections_active", "Active control channel connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));

        metric!("playspace_frames_received_total", "Boundary frames received", "counter",
            self.frames_received.load(Ordering::Relaxed));
        metric!("playspace_frames_malformed_total", "Boundary frames discarded as malformed", "counter",
            self.frames_malformed.load(Ordering::Relaxed));
        metric!("playspace_frames_invalid_pose_total", "Boundary frames dropped for invalid head pose", "counter",
            self.frames_invalid_pose.load(Ordering::Relaxed));
        metric!("playspace_frames_debounced_total", "Boundary frames matching the live boundary", "counter",
            self.frames_debounced.load(Ordering::Relaxed));
        metric!("playspace_boundary_commits_total", "Boundaries committed as live", "counter",
            self.boundary_commits.load(Ordering::Relaxed));
        metric!("playspace_boundary_resets_total", "Boundary reset frames handled", "counter",
            self.boundary_resets.load(Ordering::Relaxed));
        metric!("playspace_commit_failures_total", "Commits rejected by the tracking runtime", "counter",
            self.commit_failures.load(Ordering::Relaxed));

        metric!("playspace_comfort_ticks_total", "Comfort ticks processed", "counter",
            self.comfort_ticks.load(Ordering::Relaxed));
        metric!("playspace_tick_time_microseconds", "Last comfort tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("playspace_tick_time_p95_microseconds", "95th percentile comfort tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("playspace_tick_time_p99_microseconds", "99th percentile comfort tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("playspace_tick_time_max_microseconds", "Maximum comfort tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("playspace_auto_turn_activations_total", "Walls that armed auto-turn", "counter",
            self.auto_turn_activations.load(Ordering::Relaxed));
        metric!("playspace_ratchet_steps_total", "View ratchet steps applied", "counter",
            self.ratchet_steps.load(Ordering::Relaxed));

        metric!("playspace_uptime_seconds", "Service uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let value = json!({
            "discovery": {
                "advertisements_sent": self.advertisements_sent.load(Ordering::Relaxed),
            },
            "connections": {
                "accepted": self.connections_accepted.load(Ordering::Relaxed),
                "active": self.connections_active.load(Ordering::Relaxed),
            },
            "frames": {
                "received": self.frames_received.load(Ordering::Relaxed),
                "malformed": self.frames_malformed.load(Ordering::Relaxed),
                "invalid_pose": self.frames_invalid_pose.load(Ordering::Relaxed),
                "debounced": self.frames_debounced.load(Ordering::Relaxed),
                "commits": self.boundary_commits.load(Ordering::Relaxed),
                "resets": self.boundary_resets.load(Ordering::Relaxed),
                "commit_failures": self.commit_failures.load(Ordering::Relaxed),
            },
            "comfort": {
                "ticks": self.comfort_ticks.load(Ordering::Relaxed),
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "auto_turn_activations": self.auto_turn_activations.load(Ordering::Relaxed),
                "ratchet_steps": self.ratchet_steps.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
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
    // More specific paths first
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
