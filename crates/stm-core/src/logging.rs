//! Tracing setup.
//!
//! All log output goes to stderr; stdout is reserved for the stdout sample
//! sink. `RUST_LOG` overrides the verbosity-derived filter.

use stm_common::OutputLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(level: OutputLevel) {
    let default_filter = match level {
        OutputLevel::Quiet => "stm_core=error",
        OutputLevel::Normal | OutputLevel::Talkative => "stm_core=info",
        OutputLevel::Verbose => "stm_core=debug",
        OutputLevel::ExtraVerbose => "stm_core=trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
