use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

/// error, warn, info and debug in any case, everything else is rejected
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        _ => None,
    }
}

pub fn setup_logging(settings: &LogSettings) -> Result<()> {
    let parsed = parse_level(&settings.level);
    let level = parsed.unwrap_or(Level::INFO);

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::default()
        .add_directive(LevelFilter::from_level(level).into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("h2=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .context("a global subscriber was already installed")?;

    if parsed.is_none() {
        tracing::warn!(
            "unrecognized log level {:?}, will default to `info` log level",
            settings.level
        );
    }

    Ok(())
}
