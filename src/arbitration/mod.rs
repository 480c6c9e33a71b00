//! Client side of the remote lease arbitration service
//!
//! # Example Usage
//!
//! ```ignore
//! use leasesync::arbitration::{ArbitrationClient, HttpArbitrationClient};
//!
//! let client = HttpArbitrationClient::from_config(&config)?;
//! let status = client.probe("ACM-TEST", &identity).await?;
//! if status.available {
//!     let grant = client.checkout("ACM-TEST", &identity).await?;
//! }
//! ```

pub mod error;
pub mod http;
pub mod response;
pub mod traits;

pub use error::ArbitrationError;
pub use http::{Action, HttpArbitrationClient, CLIENT_VERSION};
pub use response::{CheckoutResponse, ProbeResponse, ResponseTokens};
pub use traits::{ArbitrationClient, ArbitrationResult};

// vim: ts=4
