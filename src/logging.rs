use anyhow::{Context, anyhow};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Value of the `app` field on every log record.
pub const APP_NAME: &str = "deriv-bot";

/// Parses a level name such as `info` or `WARN`.
pub fn parse_level(level: &str) -> anyhow::Result<Level> {
    level
        .trim()
        .parse::<Level>()
        .map_err(|_| anyhow!("invalid log level '{level}', expected one of trace, debug, info, warn, error"))
}

/// Installs the global subscriber. `RUST_LOG` directives, when set, refine the
/// default level.
pub fn init_logger(level: &str, text: bool) -> anyhow::Result<()> {
    let level = parse_level(level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    if text {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("failed to install the log subscriber")?;
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false).with_span_list(true))
            .try_init()
            .context("failed to install the log subscriber")?;
    }
    Ok(())
}

/// The span every record of a run is emitted in, carrying `app` and `ver`.
pub fn root_span(version: &str) -> tracing::Span {
    tracing::info_span!("bot", app = APP_NAME, ver = version)
}
