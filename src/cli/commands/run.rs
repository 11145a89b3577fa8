//! `run`: the long-lived bot process.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::{discord, load_config};
use crate::api::{self, ApiState};
use crate::cli::args::RunArgs;
use crate::error::TimeBombError;
use crate::observability::metrics;
use crate::store::TimerStore;
use crate::sweep;
use crate::tracker::Tracker;

/// Starts the sweep loop and the admin API, then waits for `cancel`.
///
/// # Errors
///
/// Returns a config error for a bad configuration, a store error for an
/// unreadable data file, a usage error for a missing token or bad bind
/// address, or an I/O error if the listener cannot bind.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), TimeBombError> {
    let config = load_config(&args.config.config)?;

    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let platform = discord(&args.discord, config.guild_id)?;

    let store = TimerStore::load(&config.data_file)?;
    tracing::info!(
        data_file = %config.data_file.display(),
        tracked = store.len(),
        "timer store loaded"
    );
    metrics::set_tracked_users(store.len());
    let store = store.into_shared();

    let addr = api::parse_bind_addr(&args.bind)?;
    let listener = TcpListener::bind(addr).await?;

    let tracker = Arc::new(Tracker::new(
        Arc::clone(&store),
        platform,
        Arc::clone(&config),
    ));
    let sweeper = sweep::spawn(
        Arc::clone(&tracker),
        config.timers.sweep_interval,
        cancel.clone(),
    );
    tracing::info!(
        interval = %humantime::format_duration(config.timers.sweep_interval),
        "sweep scheduled"
    );

    let state = ApiState::new(Arc::clone(&tracker), args.api_token.clone());
    let served = api::serve(listener, state, cancel.clone()).await;

    // The API only returns early on error; stop the sweep either way.
    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "sweep task panicked");
    }

    let store = store.lock().await;
    store.save()?;
    tracing::info!(tracked = store.len(), "timer store saved, shutting down");
    drop(store);

    served
}
