//! Shared list of users allowed to check the database out
//!
//! `accessList.txt` in the share root holds one user name per line. Matching
//! is case-insensitive and blank lines are ignored.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::logging::*;
use crate::session::Identity;

/// File name of the access list inside the share root
pub const ACCESS_LIST_FILENAME: &str = "accessList.txt";

#[derive(Debug, Clone)]
pub struct AccessList {
	share_root: PathBuf,
}

impl AccessList {
	pub fn new(share_root: &Path) -> Self {
		AccessList { share_root: share_root.to_path_buf() }
	}

	pub fn path(&self) -> PathBuf {
		self.share_root.join(ACCESS_LIST_FILENAME)
	}

	/// Whether `identity` may take the lease
	///
	/// A missing list, an unreadable list, or an identity without a user name
	/// all mean no.
	pub async fn has_write_access(&self, identity: &Identity) -> bool {
		let Some(user) = identity.username.as_deref() else {
			debug!("No user name configured; write access denied");
			return false;
		};

		let contents = match fs::read_to_string(self.path()).await {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
			Err(e) => {
				warn!("Cannot read access list {}: {}", self.path().display(), e);
				return false;
			}
		};

		contents
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.any(|line| line.eq_ignore_ascii_case(user))
	}

	/// True when the share root exists and contains nothing at all
	pub async fn share_root_is_empty(&self) -> io::Result<bool> {
		let mut entries = match fs::read_dir(&self.share_root).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(e),
		};
		Ok(entries.next_entry().await?.is_none())
	}

	/// Make `identity` the sole writer of a brand-new, empty share root
	///
	/// Returns whether `identity` gets write access. This is the only code
	/// path that creates the list. Access is granted on an empty share root
	/// even when the list cannot be written.
	pub async fn seed_if_empty(&self, share_root_is_empty: bool, identity: &Identity) -> bool {
		if !share_root_is_empty {
			return false;
		}
		let Some(user) = identity.username.as_deref() else {
			return false;
		};

		match fs::write(self.path(), format!("{}\n", user)).await {
			Ok(()) => info!("Seeded access list {} with {}", self.path().display(), user),
			Err(e) => warn!(
				"Cannot write access list {}: {}; granting {} anyway",
				self.path().display(),
				e,
				user
			),
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn ann() -> Identity {
		Identity::new(Some("Ann"), "ann@example.org", "pc1")
	}

	#[tokio::test]
	async fn test_membership_is_case_insensitive() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join(ACCESS_LIST_FILENAME), "bob\n\n  ANN  \n").unwrap();
		let list = AccessList::new(dir.path());
		assert!(list.has_write_access(&ann()).await);
		assert!(!list.has_write_access(&Identity::new(Some("carl"), "", "pc")).await);
	}

	#[tokio::test]
	async fn test_missing_list_or_user_denies() {
		let dir = TempDir::new().unwrap();
		let list = AccessList::new(dir.path());
		assert!(!list.has_write_access(&ann()).await);

		std::fs::write(list.path(), "ann\n").unwrap();
		assert!(!list.has_write_access(&Identity::new(None, "", "pc")).await);
	}

	#[tokio::test]
	async fn test_seed_only_when_empty() {
		let dir = TempDir::new().unwrap();
		let list = AccessList::new(dir.path());
		assert!(list.share_root_is_empty().await.unwrap());

		assert!(!list.seed_if_empty(false, &ann()).await);
		assert!(!list.path().exists());

		assert!(list.seed_if_empty(true, &ann()).await);
		assert_eq!(std::fs::read_to_string(list.path()).unwrap(), "Ann\n");
		assert!(!list.share_root_is_empty().await.unwrap());
		assert!(list.has_write_access(&ann()).await);
	}

	#[tokio::test]
	async fn test_seed_write_failure_still_grants() {
		let dir = TempDir::new().unwrap();
		let list = AccessList::new(dir.path());
		// a directory where the list should go makes the write fail
		std::fs::create_dir(list.path()).unwrap();

		assert!(list.seed_if_empty(true, &ann()).await);
		assert!(list.path().is_dir());
		assert!(!list.seed_if_empty(true, &Identity::new(None, "", "pc")).await);
	}

	#[tokio::test]
	async fn test_missing_share_root_is_not_empty() {
		let dir = TempDir::new().unwrap();
		let list = AccessList::new(&dir.path().join("absent"));
		assert!(!list.share_root_is_empty().await.unwrap());
	}
}

// vim: ts=4
