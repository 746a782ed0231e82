use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `--log-level` applies to the hciwire crates; everything else stays at
/// `warn` or quieter.
fn target_filter(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target("hciwire", level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Install the stderr subscriber.
///
/// Targets are printed at `trace` so packet lines from `hciwire::monitor`
/// stand apart from reader diagnostics.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let level = LevelFilter::from(level);
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(level == LevelFilter::TRACE);
    let registry = tracing_subscriber::registry().with(target_filter(level));

    let _ = match format {
        LogFormat::Text => registry.with(fmt).try_init(),
        LogFormat::Json => registry.with(fmt.json()).try_init(),
    };
}
