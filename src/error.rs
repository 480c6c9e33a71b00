//! Error types for leasesync operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::arbitration::ArbitrationError;

/// Main error type for checkout/checkin sessions
///
/// Only the conditions that end a session (or a single operation) live here.
/// Recoverable negotiation failures are turned into a
/// [`SandboxReason`](crate::types::SandboxReason) by the coordinator instead.
#[derive(Debug)]
pub enum CheckoutError {
	/// Another local process holds the process lock for this database
	ProcessAlreadyLocked { path: String },

	/// Offline and no snapshot of the database exists in the share root
	NoSnapshotAvailableOffline { share_root: String },

	/// Online, the database exists, but no snapshot has arrived locally yet
	NoSnapshotAvailable { expected: String, share_root: String },

	/// A held checkout exists but sandbox mode was requested
	PreviouslyCheckedOut { current: String },

	/// The user aborted at a prompt
	Aborted,

	/// Operation not valid in the coordinator's current state
	InvalidState { message: String },

	/// Arbitration service error that could not be converted into a fallback
	Arbitration(ArbitrationError),

	/// Snapshot naming error (nested)
	Snapshot(SnapshotError),

	/// Zip/unzip error (nested)
	Archive(ArchiveError),

	/// Lease record error (nested)
	State(StateError),

	/// Process lock error (nested)
	Lock(LockError),

	/// Configuration error (nested)
	Config(ConfigError),

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for CheckoutError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CheckoutError::ProcessAlreadyLocked { path } => {
				write!(f, "Database is already open in another process (lock: {})", path)
			}
			CheckoutError::NoSnapshotAvailableOffline { share_root } => {
				write!(
					f,
					"Cannot reach the arbitration service and no snapshot is available in {}",
					share_root
				)
			}
			CheckoutError::NoSnapshotAvailable { expected, share_root } => {
				write!(
					f,
					"No snapshot of the database is available in {} (server expects {}); \
					 the sync service may not have delivered it yet",
					share_root, expected
				)
			}
			CheckoutError::PreviouslyCheckedOut { current } => {
				write!(
					f,
					"Database is checked out on this machine (based on {}); it cannot be opened in sandbox mode",
					current
				)
			}
			CheckoutError::Aborted => write!(f, "Operation aborted by user"),
			CheckoutError::InvalidState { message } => write!(f, "Invalid state: {}", message),
			CheckoutError::Arbitration(e) => write!(f, "Arbitration error: {}", e),
			CheckoutError::Snapshot(e) => write!(f, "Snapshot error: {}", e),
			CheckoutError::Archive(e) => write!(f, "Archive error: {}", e),
			CheckoutError::State(e) => write!(f, "Lease record error: {}", e),
			CheckoutError::Lock(e) => write!(f, "Process lock error: {}", e),
			CheckoutError::Config(e) => write!(f, "Configuration error: {}", e),
			CheckoutError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for CheckoutError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			CheckoutError::Arbitration(e) => Some(e),
			CheckoutError::Snapshot(e) => Some(e),
			CheckoutError::Archive(e) => Some(e),
			CheckoutError::State(e) => Some(e),
			CheckoutError::Lock(e) => Some(e),
			CheckoutError::Config(e) => Some(e),
			CheckoutError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl CheckoutError {
	/// True for errors that must stop the application from starting
	pub fn is_fatal(&self) -> bool {
		!matches!(self, CheckoutError::Arbitration(_) | CheckoutError::Archive(_))
	}
}

impl From<io::Error> for CheckoutError {
	fn from(e: io::Error) -> Self {
		CheckoutError::Io(e)
	}
}

impl From<ArbitrationError> for CheckoutError {
	fn from(e: ArbitrationError) -> Self {
		CheckoutError::Arbitration(e)
	}
}

impl From<SnapshotError> for CheckoutError {
	fn from(e: SnapshotError) -> Self {
		CheckoutError::Snapshot(e)
	}
}

impl From<ArchiveError> for CheckoutError {
	fn from(e: ArchiveError) -> Self {
		CheckoutError::Archive(e)
	}
}

impl From<StateError> for CheckoutError {
	fn from(e: StateError) -> Self {
		CheckoutError::State(e)
	}
}

impl From<LockError> for CheckoutError {
	fn from(e: LockError) -> Self {
		match e {
			LockError::AlreadyLocked { path } => CheckoutError::ProcessAlreadyLocked { path },
			other => CheckoutError::Lock(other),
		}
	}
}

impl From<ConfigError> for CheckoutError {
	fn from(e: ConfigError) -> Self {
		CheckoutError::Config(e)
	}
}

/// Snapshot filename errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
	/// Name does not have the `<prefix><integer>.<ext>` shape
	MalformedName { name: String },

	/// Version number would overflow
	VersionOverflow { name: String },
}

impl fmt::Display for SnapshotError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SnapshotError::MalformedName { name } => {
				write!(f, "Malformed snapshot name: {}", name)
			}
			SnapshotError::VersionOverflow { name } => {
				write!(f, "Snapshot version cannot be incremented: {}", name)
			}
		}
	}
}

impl Error for SnapshotError {}

/// Zip/unzip errors
#[derive(Debug)]
pub enum ArchiveError {
	/// Reading or writing the archive failed
	Zip { path: String, message: String },

	/// Filesystem error while walking or materializing a tree
	Io { path: String, source: io::Error },

	/// Blocking task failed to complete
	Task { message: String },
}

impl fmt::Display for ArchiveError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ArchiveError::Zip { path, message } => write!(f, "Zip error on {}: {}", path, message),
			ArchiveError::Io { path, source } => write!(f, "I/O error on {}: {}", path, source),
			ArchiveError::Task { message } => write!(f, "Archive task failed: {}", message),
		}
	}
}

impl Error for ArchiveError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ArchiveError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Lease record persistence errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load the record
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to write the record
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to remove the record
	ClearFailed { source: Box<dyn Error + Send + Sync> },

	/// Record file exists but cannot be parsed
	Corrupted { path: String, message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load lease record: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save lease record: {}", source),
			StateError::ClearFailed { source } => {
				write!(f, "Failed to clear lease record: {}", source)
			}
			StateError::Corrupted { path, message } => {
				write!(f, "Lease record {} is corrupted: {}", path, message)
			}
		}
	}
}

impl Error for StateError {}

/// Process lock errors
#[derive(Debug)]
pub enum LockError {
	/// Lock is held by another process (or another handle in this one)
	AlreadyLocked { path: String },

	/// I/O error while creating or locking the artifact
	Io { path: String, operation: String, source: io::Error },
}

impl fmt::Display for LockError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LockError::AlreadyLocked { path } => write!(f, "Lock already held: {}", path),
			LockError::Io { path, operation, source } => {
				write!(f, "I/O error during {} on {}: {}", operation, path, source)
			}
		}
	}
}

impl Error for LockError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			LockError::AlreadyLocked { .. } => None,
			LockError::Io { source, .. } => Some(source),
		}
	}
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// A setting has an invalid value
	Invalid { field: String, message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => write!(f, "Cannot read {}: {}", path, source),
			ConfigError::Parse { path, message } => write!(f, "Cannot parse {}: {}", path, message),
			ConfigError::Invalid { field, message } => {
				write!(f, "Invalid value for {}: {}", field, message)
			}
		}
	}
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lock_error_converts_to_process_already_locked() {
		let err: CheckoutError = LockError::AlreadyLocked { path: "/tmp/x.lock".into() }.into();
		assert!(matches!(err, CheckoutError::ProcessAlreadyLocked { .. }));
		assert!(err.is_fatal());
		assert!(err.to_string().contains("/tmp/x.lock"));
	}

	#[test]
	fn test_snapshot_error_display() {
		let err = SnapshotError::MalformedName { name: "db3 (conflicted copy).zip".into() };
		assert!(err.to_string().contains("conflicted copy"));
	}
}

// vim: ts=4
