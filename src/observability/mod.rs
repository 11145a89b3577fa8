//! Observability module
//!
//! Logging and metrics for the daemon and the one-shot commands.

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
