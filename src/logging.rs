//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Checked out {}", db);
//! warn!("Falling back to sandbox mode: {}", reason);
//! ```

pub use tracing::{debug, error, info, warn};

use crate::config::{Config, LogFormat};

/// Initialize the tracing subscriber with environment filter support.
///
/// The configured `logLevel` is the default filter. `RUST_LOG` overrides it:
///
/// ```bash
/// RUST_LOG=debug leasesync open
/// RUST_LOG=leasesync::coordinator=trace leasesync open
/// ```
pub fn init_tracing(config: &Config) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

	let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

	// A second init (e.g. from tests) keeps the first subscriber
	let _ = match config.log_format {
		LogFormat::Pretty => builder.pretty().try_init(),
		LogFormat::Compact => builder.compact().try_init(),
	};
}

// vim: ts=4
