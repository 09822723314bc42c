//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Compact,
    Json,
}

/// Maps the number of `-v` flags to a max level, starting from `base`.
pub fn level_for_verbosity(base: Level, verbose: u8) -> Level {
    let mut level = base;
    for _ in 0..verbose {
        level = match level {
            Level::ERROR => Level::WARN,
            Level::WARN => Level::INFO,
            Level::INFO => Level::DEBUG,
            _ => Level::TRACE,
        };
    }
    level
}

fn env_filter(level: Level) -> EnvFilter {
    // RUST_LOG takes precedence over the default directive.
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Configure the global tracing subscriber.
///
/// Does nothing if a global subscriber has already been set.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(writer);

    let result = match format {
        LogFormat::HumanReadable => builder.with_file(true).with_line_number(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("Failed to set global logger: {e}");
    }
}
