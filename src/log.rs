//! Logging setup, grounded on cascade's `log.rs` but reduced to the subset
//! a single-process signing loop needs: no syslog transport, no
//! remote-controlled reload handle — just an `EnvFilter`-driven `fmt` layer
//! with color support probed the same way cascade probes it.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Initializes the global [`tracing`] subscriber.
///
/// `debug` raises the default level from `INFO` to `DEBUG`; `RUST_LOG`, if
/// set, always takes precedence (the normal `EnvFilter` behavior).
///
/// ## Panics
///
/// Panics if a global `tracing` subscriber has already been installed.
pub fn init(debug: bool) {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let layer = FmtLayer::new()
        .with_ansi(supports_color::on(supports_color::Stream::Stderr).is_some())
        .with_writer(std::io::stderr);

    Registry::default().with(filter).with(layer).init();
}
