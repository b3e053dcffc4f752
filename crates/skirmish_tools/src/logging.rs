//! Log filtering for the command-line tools.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Filter for the tools' log output.
///
/// `directives` uses `RUST_LOG` syntax. The default level is `debug` when
/// `verbose` is set and `info` otherwise.
#[must_use]
pub fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(directives.unwrap_or_default())
}
