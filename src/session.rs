//! Per-session identity and resolved configuration
//!
//! Built once at startup and handed to the coordinator; nothing here is
//! global.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::snapshot::SnapshotNaming;

/// Fallback machine name when the host name cannot be determined
pub const UNKNOWN_COMPUTER: &str = "UNKNOWN";

/// Who is asking for the lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
	/// User name; `None` means no write access can ever be granted
	pub username: Option<String>,
	pub contact: String,
	pub computer_name: String,
}

impl Identity {
	pub fn new(username: Option<&str>, contact: &str, computer_name: &str) -> Self {
		Identity {
			username: username.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string),
			contact: contact.to_string(),
			computer_name: computer_name.to_string(),
		}
	}

	/// Resolve from config, then the environment, then the host
	pub fn from_config(config: &Config) -> Self {
		let username = config
			.username
			.clone()
			.or_else(|| std::env::var("USER").ok())
			.or_else(|| std::env::var("USERNAME").ok());

		let computer_name = config
			.computer_name
			.clone()
			.or_else(sysinfo::System::host_name)
			.filter(|n| !n.trim().is_empty())
			.unwrap_or_else(|| UNKNOWN_COMPUTER.to_string());

		Identity::new(
			username.as_deref(),
			config.contact.as_deref().unwrap_or_default(),
			&computer_name,
		)
	}

	/// Name shown to other users as the lease possessor
	pub fn display_name(&self) -> String {
		format!("{}@{}", self.username.as_deref().unwrap_or("anonymous"), self.computer_name)
	}
}

/// Local paths used by one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
	pub share_root: PathBuf,
	pub lock: PathBuf,
	pub lease: PathBuf,
	pub mirror: PathBuf,
}

/// Everything a coordinator needs to know about its session
#[derive(Debug, Clone)]
pub struct SessionContext {
	pub config: Config,
	pub identity: Identity,
	pub naming: SnapshotNaming,
	pub paths: SessionPaths,
}

impl SessionContext {
	/// Validate the config and derive identity and paths from it
	pub fn from_config(config: Config) -> Result<Self, ConfigError> {
		let identity = Identity::from_config(&config);
		Self::with_identity(config, identity)
	}

	/// Same as [`SessionContext::from_config`] with an explicit identity
	pub fn with_identity(config: Config, identity: Identity) -> Result<Self, ConfigError> {
		config.validate()?;
		let naming = SnapshotNaming::new(&config.snapshot_prefix, &config.snapshot_extension);
		let paths = SessionPaths {
			share_root: config.share_root.clone(),
			lock: config.lock_path(),
			lease: config.lease_path(),
			mirror: config.mirror_dir(),
		};
		Ok(SessionContext { config, identity, naming, paths })
	}

	pub fn db_name(&self) -> &str {
		&self.config.db_name
	}

	pub fn share_root(&self) -> &Path {
		&self.paths.share_root
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identity_blank_username_is_none() {
		let id = Identity::new(Some("  "), "", "host");
		assert_eq!(id.username, None);
		assert_eq!(id.display_name(), "anonymous@host");
	}

	#[test]
	fn test_identity_prefers_config() {
		let config = Config {
			username: Some("carol".to_string()),
			computer_name: Some("studio-pc".to_string()),
			contact: Some("carol@example.org".to_string()),
			..Config::default()
		};
		let id = Identity::from_config(&config);
		assert_eq!(id.username.as_deref(), Some("carol"));
		assert_eq!(id.computer_name, "studio-pc");
		assert_eq!(id.contact, "carol@example.org");
	}

	#[test]
	fn test_context_paths_follow_config() {
		let config = Config {
			temp_dir: PathBuf::from("/var/tmp/ls"),
			share_root: PathBuf::from("/srv/share"),
			db_name: "ACM-1".to_string(),
			..Config::default()
		};
		let ctx = SessionContext::with_identity(config, Identity::new(Some("a"), "", "h")).unwrap();
		assert_eq!(ctx.paths.lock, PathBuf::from("/var/tmp/ls/ACM-1.lock"));
		assert_eq!(ctx.paths.mirror, PathBuf::from("/var/tmp/ls/ACM-1"));
		assert_eq!(ctx.share_root(), Path::new("/srv/share"));
	}

	#[test]
	fn test_context_rejects_invalid_config() {
		let config = Config { db_name: String::new(), ..Config::default() };
		assert!(SessionContext::from_config(config).is_err());
	}
}

// vim: ts=4
