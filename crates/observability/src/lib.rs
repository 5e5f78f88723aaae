//! Logging for relaymesh nodes.
//!
//! Nodes call [`init_logging`] once at startup. Tests call
//! [`init_test_tracing`], which can run any number of times.

use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Default verbosity when neither `RUST_LOG` nor the config says otherwise.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,

    /// Extra filter directives applied on top, e.g. `relaymesh_relay_metadata=trace`
    #[serde(default)]
    pub directives: Vec<String>,
}

/// Build the filter: `RUST_LOG` when set, otherwise the configured level,
/// with the configured directives layered over either.
pub fn env_filter(config: &LogConfig) -> eyre::Result<EnvFilter> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|env| !env.trim().is_empty());
    build_filter(from_env.as_deref(), config)
}

fn build_filter(base: Option<&str>, config: &LogConfig) -> eyre::Result<EnvFilter> {
    let mut filter = match base {
        Some(base) => EnvFilter::try_new(base).wrap_err("invalid RUST_LOG filter")?,
        None => EnvFilter::new(config.level.to_string()),
    };
    for directive in &config.directives {
        let directive: Directive = directive
            .parse()
            .wrap_err_with(|| format!("invalid log directive `{directive}`"))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> eyre::Result<()> {
    let filter = env_filter(config)?;

    let layer = if config.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .wrap_err("failed to install tracing subscriber")?;

    Ok(())
}

/// Initializes a tracing subscriber for tests that's configurable with
/// `RUST_LOG`. Silently does nothing if a subscriber is already installed.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(fmt::format::FmtSpan::ACTIVE)
        .with_test_writer()
        .try_init();
}
