//! Arbitration service interface
//!
//! The coordinator depends only on this trait, so tests can substitute an
//! in-memory arbiter for the HTTP one.

use async_trait::async_trait;

use super::error::ArbitrationError;
use super::response::{CheckoutResponse, ProbeResponse};
use crate::session::Identity;

/// Result type for arbitration calls
pub type ArbitrationResult<T> = Result<T, ArbitrationError>;

/// Remote authority granting at most one checkout lease per database
///
/// Implementations never retry; every call is a single round trip.
#[async_trait]
pub trait ArbitrationClient: Send + Sync {
	/// Read-only status check; must not change remote state
	async fn probe(&self, db: &str, identity: &Identity) -> ArbitrationResult<ProbeResponse>;

	/// Ask for the lease
	async fn checkout(&self, db: &str, identity: &Identity) -> ArbitrationResult<CheckoutResponse>;

	/// Return the lease. `Some(filename)` publishes a new snapshot,
	/// `None` discards the checkout.
	///
	/// A discard whose round trip completes always returns `Ok(true)`.
	async fn checkin(
		&self,
		db: &str,
		identity: &Identity,
		key: &str,
		filename: Option<&str>,
	) -> ArbitrationResult<bool>;
}

// vim: ts=4
