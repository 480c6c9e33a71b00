//! Configuration for leasesync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`~/.leasesync/config.toml` or `config.json`)
//! 3. Environment variables (`LEASESYNC_*` prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "LEASESYNC_";

/// Configuration for one shared database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// SHARED DATABASE
	// ========================================================================
	/// Synced folder holding snapshots and the access list
	pub share_root: PathBuf,

	/// Database name, used as the arbitration `db` parameter and for local
	/// artifact names
	pub db_name: String,

	/// Snapshot filename prefix (`db` → `db1.zip`)
	pub snapshot_prefix: String,

	/// Snapshot filename extension
	pub snapshot_extension: String,

	// ========================================================================
	// LOCAL STATE
	// ========================================================================
	/// Per-machine directory for the process lock, lease record and mirror
	pub temp_dir: PathBuf,

	/// Open every session in sandbox mode without asking
	pub force_sandbox: bool,

	/// Release the process lock on SIGINT/SIGTERM
	pub handle_signals: bool,

	// ========================================================================
	// ARBITRATION SERVICE
	// ========================================================================
	/// Endpoint for `statusCheck` and `checkout`
	pub checkout_url: String,

	/// Endpoint for `checkin` and `discard`
	pub checkin_url: String,

	/// URL fetched to decide whether we are online
	pub connectivity_url: String,

	/// Whole-request timeout in seconds
	pub request_timeout_secs: u64,

	/// Connect timeout in seconds
	pub connect_timeout_secs: u64,

	// ========================================================================
	// IDENTITY
	// ========================================================================
	/// User name; falls back to `$USER`/`$USERNAME`
	pub username: Option<String>,

	/// Contact information sent with every request
	pub contact: Option<String>,

	/// Machine name; falls back to the host name
	pub computer_name: Option<String>,

	// ========================================================================
	// OUTPUT & LOGGING
	// ========================================================================
	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,

	/// Log format
	pub log_format: LogFormat,
}

impl Default for Config {
	fn default() -> Self {
		let home = std::env::var("HOME")
			.ok()
			.map(|h| PathBuf::from(h).join(".leasesync"))
			.unwrap_or_else(|| PathBuf::from(".leasesync"));

		Config {
			share_root: home.join("share"),
			db_name: "default".to_string(),
			snapshot_prefix: "db".to_string(),
			snapshot_extension: "zip".to_string(),

			temp_dir: home.join("temp"),
			force_sandbox: false,
			handle_signals: true,

			checkout_url: "http://localhost:8080/checkout".to_string(),
			checkin_url: "http://localhost:8080/checkin".to_string(),
			connectivity_url: "http://localhost:8080/".to_string(),
			request_timeout_secs: 30,
			connect_timeout_secs: 10,

			username: None,
			contact: None,
			computer_name: None,

			log_level: "info".to_string(),
			log_format: LogFormat::Compact,
		}
	}
}

impl Config {
	/// Load a config file over the defaults; `.json`/`.json5` files are read
	/// with json5, everything else as TOML
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Read { path: path.display().to_string(), source: e })?;
		let parse_err =
			|message: String| ConfigError::Parse { path: path.display().to_string(), message };

		let is_json = path
			.extension()
			.and_then(|e| e.to_str())
			.map(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("json5"))
			.unwrap_or(false);

		if is_json {
			json5::from_str(&content).map_err(|e| parse_err(e.to_string()))
		} else {
			toml::from_str(&content).map_err(|e| parse_err(e.to_string()))
		}
	}

	/// Apply `LEASESYNC_*` overrides from the process environment
	pub fn apply_env(&mut self) -> Result<(), ConfigError> {
		self.apply_env_from(|key| std::env::var(key).ok())
	}

	/// Apply overrides from an arbitrary lookup (testable without touching
	/// the process environment)
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

		if let Some(v) = get("SHARE_ROOT") {
			self.share_root = PathBuf::from(v);
		}
		if let Some(v) = get("DB_NAME") {
			self.db_name = v;
		}
		if let Some(v) = get("TEMP_DIR") {
			self.temp_dir = PathBuf::from(v);
		}
		if let Some(v) = get("CHECKOUT_URL") {
			self.checkout_url = v;
		}
		if let Some(v) = get("CHECKIN_URL") {
			self.checkin_url = v;
		}
		if let Some(v) = get("CONNECTIVITY_URL") {
			self.connectivity_url = v;
		}
		if let Some(v) = get("USERNAME") {
			self.username = Some(v);
		}
		if let Some(v) = get("CONTACT") {
			self.contact = Some(v);
		}
		if let Some(v) = get("FORCE_SANDBOX") {
			self.force_sandbox = parse_bool("FORCE_SANDBOX", &v)?;
		}
		if let Some(v) = get("LOG_LEVEL") {
			self.log_level = v;
		}
		Ok(())
	}

	/// Reject settings that would produce unusable paths or names
	pub fn validate(&self) -> Result<(), ConfigError> {
		check_simple_name("dbName", &self.db_name)?;
		check_simple_name("snapshotPrefix", &self.snapshot_prefix)?;
		if self.snapshot_prefix.chars().last().map(|c| c.is_ascii_digit()).unwrap_or(false) {
			return Err(ConfigError::Invalid {
				field: "snapshotPrefix".to_string(),
				message: "must not end with a digit".to_string(),
			});
		}
		check_simple_name("snapshotExtension", self.snapshot_extension.trim_start_matches('.'))?;
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "requestTimeoutSecs".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}

	/// Per-machine process lock path: `<tempDir>/<dbName>.lock`
	pub fn lock_path(&self) -> PathBuf {
		self.temp_dir.join(format!("{}.lock", self.db_name))
	}

	/// Per-machine lease record path: `<tempDir>/<dbName>.checkout`
	pub fn lease_path(&self) -> PathBuf {
		self.temp_dir.join(format!("{}.checkout", self.db_name))
	}

	/// Per-machine mirror directory: `<tempDir>/<dbName>/`
	pub fn mirror_dir(&self) -> PathBuf {
		self.temp_dir.join(&self.db_name)
	}
}

fn check_simple_name(field: &str, value: &str) -> Result<(), ConfigError> {
	let invalid = |message: &str| ConfigError::Invalid {
		field: field.to_string(),
		message: message.to_string(),
	};
	if value.is_empty() {
		return Err(invalid("must not be empty"));
	}
	if value.contains(['/', '\\']) || value == "." || value == ".." {
		return Err(invalid("must not contain path separators"));
	}
	Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::Invalid {
			field: format!("{}{}", ENV_PREFIX, name),
			message: format!("expected a boolean, got {:?}", value),
		}),
	}
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
	Pretty,
	#[default]
	Compact,
}


// vim: ts=4
