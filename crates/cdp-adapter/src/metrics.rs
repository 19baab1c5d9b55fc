use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub events: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub malformed_messages: u64,
    pub unmatched_responses: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static COMMAND_SUCCESS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static MALFORMED: AtomicU64 = AtomicU64::new(0);
static UNMATCHED: AtomicU64 = AtomicU64::new(0);

// Collector construction only fails on invalid metric names, which are constants here.
lazy_static! {
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("bridge_cdp_commands_total", "Total CDP commands sent"),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "bridge_cdp_command_failures_total",
            "Total CDP commands rejected by the target or lost with the channel"
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "bridge_cdp_command_duration_seconds",
            "CDP command round-trip latency",
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("bridge_cdp_events_total", "Target notifications dispatched"),
        &["method"]
    )
    .unwrap();
    static ref CDP_MALFORMED_TOTAL: IntCounter = IntCounter::new(
        "bridge_cdp_malformed_messages_total",
        "Inbound frames that were not valid protocol messages",
    )
    .unwrap();
    static ref CDP_UNMATCHED_TOTAL: IntCounter = IntCounter::new(
        "bridge_cdp_unmatched_responses_total",
        "Responses whose id matched no pending command",
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(target: "cdp-connection", ?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_COMMANDS_TOTAL.clone());
    register(registry, CDP_COMMAND_FAILURES_TOTAL.clone());
    register(registry, CDP_COMMAND_DURATION.clone());
    register(registry, CDP_EVENTS_TOTAL.clone());
    register(registry, CDP_MALFORMED_TOTAL.clone());
    register(registry, CDP_UNMATCHED_TOTAL.clone());
}

pub fn record_command(method: &str) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    CDP_COMMANDS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_event(method: &str) {
    EVENTS.fetch_add(1, Ordering::Relaxed);
    CDP_EVENTS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, duration: Duration) {
    COMMAND_SUCCESS.fetch_add(1, Ordering::Relaxed);
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
    CDP_COMMAND_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_COMMAND_FAILURES_TOTAL
        .with_label_values(&[method])
        .inc();
}

pub fn record_malformed() {
    MALFORMED.fetch_add(1, Ordering::Relaxed);
    CDP_MALFORMED_TOTAL.inc();
}

pub fn record_unmatched() {
    UNMATCHED.fetch_add(1, Ordering::Relaxed);
    CDP_UNMATCHED_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        events: EVENTS.load(Ordering::Relaxed),
        command_success: COMMAND_SUCCESS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        malformed_messages: MALFORMED.load(Ordering::Relaxed),
        unmatched_responses: UNMATCHED.load(Ordering::Relaxed),
    }
}
