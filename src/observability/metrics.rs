//! Prometheus metrics.
//!
//! The recording helpers are safe to call before (or without) a recorder
//! being installed; the `metrics` macros no-op in that case.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TimeBombError;
use crate::phase::{Phase, WarningKey};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global recorder and, when `port` is given, a Prometheus
/// scrape endpoint on `127.0.0.1:<port>`.
///
/// # Errors
///
/// Returns `TimeBombError::Io` if the recorder or listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), TimeBombError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| TimeBombError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("timebomb_sweeps_total", "Sweep ticks completed");
    describe_histogram!(
        "timebomb_sweep_duration_ms",
        "Sweep tick duration in milliseconds"
    );
    describe_counter!(
        "timebomb_warnings_total",
        "Deadline warnings issued, by window"
    );
    describe_counter!("timebomb_jails_total", "Members jailed by the sweep, by phase");
    describe_counter!(
        "timebomb_dispatch_failures_total",
        "Platform calls that failed, by action"
    );
    describe_counter!(
        "timebomb_events_total",
        "Platform events received, by type"
    );
    describe_gauge!("timebomb_tracked_users", "Users with a timer record");
}

/// Records one completed sweep tick.
pub fn record_sweep(duration: Duration) {
    counter!("timebomb_sweeps_total").increment(1);
    histogram!("timebomb_sweep_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Records a warning being issued.
pub fn record_warning(key: WarningKey) {
    counter!("timebomb_warnings_total", "window" => key.as_str()).increment(1);
}

/// Records a sweep jail.
pub fn record_jail(phase: Phase) {
    let label = match phase {
        Phase::First => "1",
        Phase::Second => "2",
    };
    counter!("timebomb_jails_total", "phase" => label).increment(1);
}

/// Records a failed platform call. `action` is an [`Action::kind`] label.
///
/// [`Action::kind`]: crate::phase::Action::kind
pub fn record_dispatch_failure(action: &'static str) {
    counter!("timebomb_dispatch_failures_total", "action" => action).increment(1);
}

/// Records a received platform event. `kind` is a fixed event label.
pub fn record_event(kind: &'static str) {
    counter!("timebomb_events_total", "type" => kind).increment(1);
}

/// Sets the tracked-user gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_users(count: usize) {
    gauge!("timebomb_tracked_users").set(count as f64);
}
