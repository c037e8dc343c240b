//! Logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows `-v`: warnings by
//! default, then info, debug and trace. Output goes to stderr so `--json`
//! results on stdout stay machine readable.

use tracing_subscriber::EnvFilter;

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(verbosity: u8) {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("audiomerge={}", level_for(verbosity))));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();

    if let Err(e) = result {
        eprintln!("warning: logging already initialised: {e}");
    }
}
