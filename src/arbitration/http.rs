//! HTTP implementation of [`ArbitrationClient`]
//!
//! Every call is a GET with query parameters
//! `db, action, name, contact, version, computername` plus `key` and
//! `filename` for checkin/discard.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::error::ArbitrationError;
use super::response::{checkin_accepted, CheckoutResponse, ProbeResponse, ResponseTokens};
use super::traits::{ArbitrationClient, ArbitrationResult};
use crate::config::Config;
use crate::logging::*;
use crate::session::Identity;

/// Version reported to the arbitration service
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request actions understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	StatusCheck,
	Checkout,
	Checkin,
	Discard,
}

impl Action {
	pub fn as_str(self) -> &'static str {
		match self {
			Action::StatusCheck => "statusCheck",
			Action::Checkout => "checkout",
			Action::Checkin => "checkin",
			Action::Discard => "discard",
		}
	}
}

/// Reqwest-based arbitration client
pub struct HttpArbitrationClient {
	client: Client,
	checkout_url: String,
	checkin_url: String,
}

impl HttpArbitrationClient {
	/// Build a client with the endpoints and timeouts from `config`
	pub fn from_config(config: &Config) -> ArbitrationResult<Self> {
		let client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.connect_timeout(Duration::from_secs(config.connect_timeout_secs))
			.user_agent(format!("leasesync/{}", CLIENT_VERSION))
			.build()
			.map_err(|e| ArbitrationError::InvalidUrl {
				url: config.checkout_url.clone(),
				message: format!("cannot build HTTP client: {}", e),
			})?;

		Self::with_client(client, &config.checkout_url, &config.checkin_url)
	}

	/// Use an existing reqwest client
	pub fn with_client(client: Client, checkout_url: &str, checkin_url: &str) -> ArbitrationResult<Self> {
		for url in [checkout_url, checkin_url] {
			reqwest::Url::parse(url).map_err(|e| ArbitrationError::InvalidUrl {
				url: url.to_string(),
				message: e.to_string(),
			})?;
		}
		Ok(HttpArbitrationClient {
			client,
			checkout_url: checkout_url.to_string(),
			checkin_url: checkin_url.to_string(),
		})
	}

	/// Perform one GET and return `(status, body)`
	async fn get(
		&self,
		url: &str,
		db: &str,
		action: Action,
		identity: &Identity,
		extra: &[(&str, &str)],
	) -> ArbitrationResult<(u16, String)> {
		let mut params: Vec<(&str, &str)> = vec![
			("db", db),
			("action", action.as_str()),
			("name", identity.username.as_deref().unwrap_or_default()),
			("contact", identity.contact.as_str()),
			("version", CLIENT_VERSION),
			("computername", identity.computer_name.as_str()),
		];
		params.extend_from_slice(extra);

		debug!(url = %url, action = action.as_str(), db = %db, "Arbitration request");

		let net_err = |e: reqwest::Error| ArbitrationError::NetworkUnreachable {
			url: url.to_string(),
			source: Box::new(e),
		};

		let response = self.client.get(url).query(&params).send().await.map_err(net_err)?;
		let status = response.status().as_u16();
		let body = response.text().await.map_err(net_err)?;

		debug!(status, body = %body.trim(), "Arbitration reply");
		Ok((status, body))
	}

	/// Like [`get`](Self::get) but turns a non-success status into an error
	async fn get_ok(
		&self,
		url: &str,
		db: &str,
		action: Action,
		identity: &Identity,
	) -> ArbitrationResult<String> {
		let (status, body) = self.get(url, db, action, identity, &[]).await?;
		if !(200..300).contains(&status) {
			return Err(ArbitrationError::Status { url: url.to_string(), status });
		}
		Ok(body)
	}
}

#[async_trait]
impl ArbitrationClient for HttpArbitrationClient {
	async fn probe(&self, db: &str, identity: &Identity) -> ArbitrationResult<ProbeResponse> {
		let body = self.get_ok(&self.checkout_url, db, Action::StatusCheck, identity).await?;
		Ok(ProbeResponse::from(ResponseTokens::parse(&body)))
	}

	async fn checkout(&self, db: &str, identity: &Identity) -> ArbitrationResult<CheckoutResponse> {
		let body = self.get_ok(&self.checkout_url, db, Action::Checkout, identity).await?;
		let response = CheckoutResponse::try_from(ResponseTokens::parse(&body))?;
		info!(db = %db, granted = response.is_granted(), "Checkout answered");
		Ok(response)
	}

	async fn checkin(
		&self,
		db: &str,
		identity: &Identity,
		key: &str,
		filename: Option<&str>,
	) -> ArbitrationResult<bool> {
		let action = if filename.is_some() { Action::Checkin } else { Action::Discard };
		let extra = [("key", key), ("filename", filename.unwrap_or_default())];
		let (status, body) = self.get(&self.checkin_url, db, action, identity, &extra).await?;

		// A completed discard round trip always counts; a checkin needs a
		// success status, and any other status is a service failure, not a denial
		let accepted = match action {
			Action::Discard => true,
			_ if !(200..300).contains(&status) => {
				return Err(ArbitrationError::Status { url: self.checkin_url.clone(), status });
			}
			_ => checkin_accepted(&body),
		};
		info!(db = %db, action = action.as_str(), accepted, "Checkin answered");
		Ok(accepted)
	}
}


// vim: ts=4
