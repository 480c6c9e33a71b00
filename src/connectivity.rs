//! Online/offline detection
//!
//! Any HTTP answer from the connectivity URL, whatever its status, counts as
//! online. Only transport failures mean offline.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::logging::*;

/// Decides whether the arbitration service is worth contacting
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
	async fn is_online(&self) -> bool;
}

pub struct HttpConnectivityProbe {
	client: Client,
	url: String,
}

impl HttpConnectivityProbe {
	pub fn new(url: &str, timeout: Duration) -> Self {
		// Builder only fails on TLS backend setup; the default client is the fallback
		let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
			warn!("Cannot configure connectivity client ({}), using defaults", e);
			Client::new()
		});
		HttpConnectivityProbe { client, url: url.to_string() }
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(&config.connectivity_url, Duration::from_secs(config.connect_timeout_secs.max(1)))
	}
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
	async fn is_online(&self) -> bool {
		match self.client.head(&self.url).send().await {
			Ok(response) => {
				debug!(url = %self.url, status = response.status().as_u16(), "Connectivity check passed");
				true
			}
			Err(e) => {
				info!(url = %self.url, "Connectivity check failed: {}", e);
				false
			}
		}
	}
}

/// Probe with a fixed answer, for forced-offline runs and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub bool);

#[async_trait]
impl ConnectivityProbe for FixedConnectivity {
	async fn is_online(&self) -> bool {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_unreachable_url_is_offline() {
		// Port 9 on localhost: nothing listens there in test environments
		let probe = HttpConnectivityProbe::new("http://127.0.0.1:9/", Duration::from_secs(2));
		assert!(!probe.is_online().await);
	}

	#[tokio::test]
	async fn test_fixed_probe() {
		assert!(FixedConnectivity(true).is_online().await);
		assert!(!FixedConnectivity(false).is_online().await);
	}
}

// vim: ts=4
