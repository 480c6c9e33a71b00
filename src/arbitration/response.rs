//! Parser for the arbitration service's `key=value` replies
//!
//! Replies are whitespace or newline separated tokens such as
//! `key=83611 filename=db4.zip` or `possessor=alice filename=db4.zip`.
//! Tokens may be wrapped in double quotes. Unknown tokens are ignored and the
//! last occurrence of a repeated key wins.

use super::error::ArbitrationError;

/// Recognized fields of one reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTokens {
	pub key: Option<String>,
	pub filename: Option<String>,
	pub possessor: Option<String>,
}

impl ResponseTokens {
	pub fn parse(body: &str) -> Self {
		let mut tokens = ResponseTokens::default();

		for raw in body.split(|c: char| c.is_whitespace() || c == '"') {
			let Some((name, value)) = raw.split_once('=') else {
				continue;
			};
			let value = value.trim_matches('"').to_string();
			match name {
				"key" => tokens.key = Some(value),
				"filename" => tokens.filename = Some(value),
				"possessor" => tokens.possessor = Some(value),
				_ => {}
			}
		}

		tokens
	}
}

/// Result of a read-only `statusCheck`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
	/// No one holds the lease
	pub available: bool,
	pub possessor: Option<String>,
	/// Snapshot the server considers current (`NULL` for a new database)
	pub filename: Option<String>,
}

impl From<ResponseTokens> for ProbeResponse {
	fn from(tokens: ResponseTokens) -> Self {
		ProbeResponse {
			available: tokens.possessor.is_none(),
			possessor: tokens.possessor,
			filename: tokens.filename,
		}
	}
}

/// Result of a `checkout` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutResponse {
	Granted { key: String, filename: Option<String> },
	Denied { possessor: String, filename: Option<String> },
}

impl CheckoutResponse {
	pub fn is_granted(&self) -> bool {
		matches!(self, CheckoutResponse::Granted { .. })
	}

	pub fn filename(&self) -> Option<&str> {
		match self {
			CheckoutResponse::Granted { filename, .. } | CheckoutResponse::Denied { filename, .. } => {
				filename.as_deref()
			}
		}
	}
}

impl TryFrom<ResponseTokens> for CheckoutResponse {
	type Error = ArbitrationError;

	/// A possessor always means denial, even when a key is also present
	fn try_from(tokens: ResponseTokens) -> Result<Self, Self::Error> {
		match (tokens.possessor, tokens.key) {
			(Some(possessor), _) => Ok(CheckoutResponse::Denied { possessor, filename: tokens.filename }),
			(None, Some(key)) => Ok(CheckoutResponse::Granted { key, filename: tokens.filename }),
			(None, None) => Err(ArbitrationError::MalformedResponse {
				message: "checkout reply has neither key nor possessor".to_string(),
			}),
		}
	}
}

/// A checkin succeeded only when the trimmed body is exactly `ok`
pub fn checkin_accepted(body: &str) -> bool {
	body.trim() == "ok"
}


// vim: ts=4
