//! Durable record of an in-flight checkout
//!
//! The record is the only state that must survive a crash: its presence is
//! the evidence that this machine holds a lease the arbitration service has
//! not seen checked back in.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Persisted checkout state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
	/// Whether the lease is held
	pub held: bool,

	/// Opaque token issued by the arbitration service
	pub key: String,

	/// Snapshot the session started from (`NULL` for a new database)
	pub current_filename: String,

	/// Snapshot a checkin will create
	pub next_filename: String,
}

/// Reads and writes the lease record file
#[derive(Debug, Clone)]
pub struct LeaseStore {
	path: PathBuf,
}

impl LeaseStore {
	pub fn new(path: PathBuf) -> Self {
		LeaseStore { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Load a previously persisted, uncleared record
	pub fn load_if_present(&self) -> Result<Option<LeaseRecord>, StateError> {
		let contents = match fs::read_to_string(&self.path) {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StateError::LoadFailed { source: Box::new(e) }),
		};

		serde_json::from_str(&contents).map(Some).map_err(|e| StateError::Corrupted {
			path: self.path.display().to_string(),
			message: e.to_string(),
		})
	}

	/// Write the record durably: temp file, fsync, rename
	pub fn persist(&self, record: &LeaseRecord) -> Result<(), StateError> {
		let save_err = |e: io::Error| StateError::SaveFailed { source: Box::new(e) };

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(save_err)?;
		}

		let json = serde_json::to_string_pretty(record)
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		let tmp = self.path.with_extension("checkout.tmp");
		{
			let mut file = fs::File::create(&tmp).map_err(save_err)?;
			file.write_all(json.as_bytes()).map_err(save_err)?;
			file.sync_all().map_err(save_err)?;
		}
		fs::rename(&tmp, &self.path).map_err(save_err)?;

		#[cfg(unix)]
		if let Some(parent) = self.path.parent() {
			if let Ok(dir) = fs::File::open(parent) {
				let _ = dir.sync_all();
			}
		}

		Ok(())
	}

	/// Delete the record; clearing an absent record succeeds
	pub fn clear(&self) -> Result<(), StateError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StateError::ClearFailed { source: Box::new(e) }),
		}
	}
}


// vim: ts=4
