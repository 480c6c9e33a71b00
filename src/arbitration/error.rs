//! Arbitration client error types

use std::error::Error;
use std::fmt;

/// Failure talking to the arbitration service
#[derive(Debug)]
pub enum ArbitrationError {
	/// Transport failure (DNS, connect, timeout, broken body)
	NetworkUnreachable { url: String, source: Box<dyn Error + Send + Sync> },

	/// Server answered with a non-success HTTP status
	Status { url: String, status: u16 },

	/// Response could not be understood
	MalformedResponse { message: String },

	/// Configured endpoint is not a usable URL
	InvalidUrl { url: String, message: String },
}

impl fmt::Display for ArbitrationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ArbitrationError::NetworkUnreachable { url, source } => {
				write!(f, "Cannot reach arbitration service at {}: {}", url, source)
			}
			ArbitrationError::Status { url, status } => {
				write!(f, "Arbitration service at {} returned HTTP {}", url, status)
			}
			ArbitrationError::MalformedResponse { message } => {
				write!(f, "Malformed arbitration response: {}", message)
			}
			ArbitrationError::InvalidUrl { url, message } => {
				write!(f, "Invalid arbitration URL {}: {}", url, message)
			}
		}
	}
}

impl Error for ArbitrationError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ArbitrationError::NetworkUnreachable { source, .. } => Some(source.as_ref()),
			_ => None,
		}
	}
}

impl ArbitrationError {
	/// True for failures worth offering a retry for
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			ArbitrationError::NetworkUnreachable { .. } | ArbitrationError::Status { .. }
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io;

	#[test]
	fn test_network_error_has_source() {
		let err = ArbitrationError::NetworkUnreachable {
			url: "http://arb/checkout".to_string(),
			source: Box::new(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
		};
		assert!(err.source().is_some());
		assert!(err.is_transient());
		assert!(err.to_string().contains("http://arb/checkout"));
	}

	#[test]
	fn test_malformed_is_not_transient() {
		let err = ArbitrationError::MalformedResponse { message: "empty".to_string() };
		assert!(!err.is_transient());
	}
}

// vim: ts=4
