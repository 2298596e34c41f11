#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]

//! Logging setup of the bridge relayer.
//!
//! Logs go to `stdout` through `tracing`, filtered by `RUST_LOG`. The format is
//! `plain` or `json`, selected by the `BRIDGE_LOG_FORMAT` env variable.
//!
//! Errors are reported to sentry if `BRIDGE_SENTRY_URL` is set
//! <https://docs.sentry.io/platforms/rust/>

use std::{backtrace::Backtrace, borrow::Cow, str::FromStr};

use sentry::{types::Dsn, ClientInitGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::{debug, error, info, trace, warn};

/// Env variable selecting the [`LogFormat`].
pub const LOG_FORMAT_VAR: &str = "BRIDGE_LOG_FORMAT";

/// Env variable holding the sentry DSN.
pub const SENTRY_URL_VAR: &str = "BRIDGE_SENTRY_URL";

/// Logging setup errors.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("{LOG_FORMAT_VAR} has an unexpected value {0}")]
    UnknownFormat(String),

    #[error("{SENTRY_URL_VAR} is not a valid DSN: {0}")]
    SentryUrl(String),
}

/// Format of the `stdout` logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable.
    #[default]
    Plain,
    /// One JSON object per line, with file and line.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

/// Names of the bridged networks, reported as the sentry environment.
#[derive(Debug, Clone)]
pub struct Networks {
    /// L1 network name.
    pub l1: String,
    /// L2 network name.
    pub l2: String,
}

fn sentry_url() -> Result<Option<Dsn>, Error> {
    match std::env::var(SENTRY_URL_VAR) {
        Ok(url) => Dsn::from_str(&url)
            .map(Some)
            .map_err(|e| Error::SentryUrl(e.to_string())),
        Err(_) => Ok(None),
    }
}

/// Initialize logging with tracing and set up log format
///
/// If a sentry URL is configured, also initializes sentry and returns its
/// guard, which has to be kept alive for events to be sent.
pub fn init(networks: &Networks) -> Result<Option<ClientInitGuard>, Error> {
    let format = match std::env::var(LOG_FORMAT_VAR) {
        Ok(format) => format.parse()?,
        Err(_) => LogFormat::default(),
    };

    match format {
        LogFormat::Plain => {
            tracing_subscriber::registry()
                .with(fmt::Layer::default())
                .with(EnvFilter::from_default_env())
                .init();
        }
        LogFormat::Json => {
            let timer = fmt::time::UtcTime::rfc_3339();
            // must be set before sentry hook for sentry to function
            install_pretty_panic_hook();

            tracing_subscriber::registry()
                .with(
                    fmt::Layer::default()
                        .with_file(true)
                        .with_line_number(true)
                        .with_timer(timer)
                        .json(),
                )
                .with(EnvFilter::from_default_env())
                .init();
        }
    }

    Ok(sentry_url()?.map(|url| {
        let options = sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(Cow::from(format!("{} - {}", networks.l1, networks.l2))),
            attach_stacktrace: true,
            ..Default::default()
        };

        sentry::init((url, options))
    }))
}

/// Format panics like tracing::error
fn install_pretty_panic_hook() {
    // Replaces the default hook so a panic is logged once.
    std::panic::set_hook(Box::new(move |panic_info| {
        let backtrace = Backtrace::capture();
        let timestamp = chrono::Utc::now();
        let panic_message = if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s
        } else {
            "Panic occurred without additional info"
        };

        let panic_location = panic_info
            .location()
            .map(|val| val.to_string())
            .unwrap_or_else(|| "Unknown location".to_owned());

        println!(
            "{}",
            serde_json::json!({
                "timestamp": timestamp.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string(),
                "level": "CRITICAL",
                "fields": {
                    "message": panic_message,
                    "location": panic_location,
                    "backtrace": backtrace.to_string(),
                }
            })
        );
    }));
}
