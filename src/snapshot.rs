//! Versioned snapshot filenames in the share root
//!
//! Snapshots are named `<prefix><N>.<ext>` (`db1.zip`, `db2.zip`, ...). The
//! arbitration service reports the string `NULL` when a database has never
//! been checked in; that maps to [`SnapshotName::NotCreated`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::SnapshotError;
use crate::logging::*;

/// Name the arbitration service uses for "database does not exist yet"
pub const NOT_CREATED_SENTINEL: &str = "NULL";

/// A well-formed, versioned snapshot filename
///
/// Keeps the spelling it was parsed from (`DB3.ZIP`, `db07.zip`) so that
/// file lookups use the name that is actually on disk. Names produced by
/// [`SnapshotId::next`] are always canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotId {
	prefix: String,
	number: u64,
	extension: String,
	file_name: String,
}

impl SnapshotId {
	fn canonical(prefix: &str, number: u64, extension: &str) -> Self {
		SnapshotId {
			prefix: prefix.to_string(),
			number,
			extension: extension.to_string(),
			file_name: format!("{}{}.{}", prefix, number, extension),
		}
	}

	/// The version number
	pub fn number(&self) -> u64 {
		self.number
	}

	/// The version following this one
	pub fn next(&self) -> Result<SnapshotId, SnapshotError> {
		let number = self
			.number
			.checked_add(1)
			.ok_or_else(|| SnapshotError::VersionOverflow { name: self.to_string() })?;
		Ok(SnapshotId::canonical(&self.prefix, number, &self.extension))
	}

	/// Filename as found on disk or reported by the server
	pub fn file_name(&self) -> &str {
		&self.file_name
	}
}

impl fmt::Display for SnapshotId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.file_name)
	}
}

/// A snapshot reference as exchanged with the arbitration service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotName {
	/// The database has never been checked in
	NotCreated,
	/// A concrete snapshot file
	Version(SnapshotId),
}

impl SnapshotName {
	pub fn is_not_created(&self) -> bool {
		matches!(self, SnapshotName::NotCreated)
	}
}

impl fmt::Display for SnapshotName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SnapshotName::NotCreated => write!(f, "{}", NOT_CREATED_SENTINEL),
			SnapshotName::Version(id) => write!(f, "{}", id),
		}
	}
}

/// A snapshot file found in the share root
#[derive(Debug, Clone)]
pub struct SnapshotFile {
	pub id: SnapshotId,
	pub path: PathBuf,
	pub modified: SystemTime,
}

/// Parses, formats and locates snapshots for one database
#[derive(Debug, Clone)]
pub struct SnapshotNaming {
	prefix: String,
	extension: String,
}

impl SnapshotNaming {
	/// Create naming rules; a leading dot on the extension is ignored
	pub fn new(prefix: &str, extension: &str) -> Self {
		SnapshotNaming {
			prefix: prefix.to_string(),
			extension: extension.trim_start_matches('.').to_string(),
		}
	}

	/// The first snapshot a new database gets
	pub fn first(&self) -> SnapshotId {
		SnapshotId::canonical(&self.prefix, 1, &self.extension)
	}

	/// Parse a filename, accepting the `NULL` sentinel
	///
	/// Prefix and extension match case-insensitively and leading zeros are
	/// allowed; the parsed id keeps the original spelling. Anything else about
	/// the name must be exact. Sync-service variants such as
	/// `db4 (conflicted copy).zip` are rejected.
	pub fn parse(&self, name: &str) -> Result<SnapshotName, SnapshotError> {
		if name.eq_ignore_ascii_case(NOT_CREATED_SENTINEL) {
			return Ok(SnapshotName::NotCreated);
		}
		self.parse_id(name).map(SnapshotName::Version)
	}

	fn parse_id(&self, name: &str) -> Result<SnapshotId, SnapshotError> {
		let malformed = || SnapshotError::MalformedName { name: name.to_string() };

		let dot = name.rfind('.').ok_or_else(malformed)?;
		let (stem, ext) = (&name[..dot], &name[dot + 1..]);
		if !ext.eq_ignore_ascii_case(&self.extension) {
			return Err(malformed());
		}
		if stem.len() <= self.prefix.len()
			|| !stem.is_char_boundary(self.prefix.len())
			|| !stem[..self.prefix.len()].eq_ignore_ascii_case(&self.prefix)
		{
			return Err(malformed());
		}

		let digits = &stem[self.prefix.len()..];
		if !digits.bytes().all(|b| b.is_ascii_digit()) {
			return Err(malformed());
		}
		let number: u64 = digits.parse().map_err(|_| malformed())?;
		if number == 0 {
			return Err(malformed());
		}

		Ok(SnapshotId {
			prefix: self.prefix.clone(),
			number,
			extension: self.extension.clone(),
			file_name: name.to_string(),
		})
	}

	/// Name of the snapshot that a checkin after `current` will create
	pub fn next_filename(&self, current: &str) -> Result<SnapshotId, SnapshotError> {
		match self.parse(current)? {
			SnapshotName::NotCreated => Ok(self.first()),
			SnapshotName::Version(id) => id.next(),
		}
	}

	/// Does `name` exist in the share root? The sentinel always "exists".
	pub fn snapshot_exists(&self, name: &SnapshotName, share_root: &Path) -> bool {
		match name {
			SnapshotName::NotCreated => true,
			SnapshotName::Version(id) => share_root.join(id.file_name()).is_file(),
		}
	}

	/// All well-formed snapshots in the share root, oldest version first
	pub fn list_snapshots(&self, share_root: &Path) -> io::Result<Vec<SnapshotFile>> {
		let mut found = Vec::new();
		let entries = match fs::read_dir(share_root) {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
			Err(e) => return Err(e),
		};

		for entry in entries {
			let entry = entry?;
			let file_name = entry.file_name();
			let Some(name) = file_name.to_str() else {
				continue;
			};
			let id = match self.parse_id(name) {
				Ok(id) => id,
				Err(_) => {
					if name.to_ascii_lowercase().ends_with(&format!(".{}", self.extension)) {
						debug!("Ignoring snapshot-like file with malformed name: {}", name);
					}
					continue;
				}
			};
			let metadata = entry.metadata()?;
			if !metadata.is_file() {
				continue;
			}
			let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
			found.push(SnapshotFile { id, path: entry.path(), modified });
		}

		found.sort_by_key(|s| s.id.number);
		Ok(found)
	}

	/// The most recently modified snapshot, used when the expected current
	/// snapshot cannot be resolved
	pub fn most_recent_snapshot(&self, share_root: &Path) -> io::Result<Option<SnapshotFile>> {
		let snapshots = self.list_snapshots(share_root)?;
		Ok(snapshots.into_iter().max_by(|a, b| {
			a.modified.cmp(&b.modified).then_with(|| a.id.number.cmp(&b.id.number))
		}))
	}

	/// Delete a superseded snapshot. Missing files and the sentinel are no-ops.
	pub fn remove_snapshot(&self, name: &SnapshotName, share_root: &Path) -> io::Result<bool> {
		let SnapshotName::Version(id) = name else {
			return Ok(false);
		};
		match fs::remove_file(share_root.join(id.file_name())) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(e),
		}
	}
}


// vim: ts=4
