//! Per-machine process lock and signal handlers for graceful termination
//!
//! One advisory lock per database keeps a second local instance from
//! touching the same mirror and lease record. The lock file is removed when
//! the guard is released, dropped, or the process is interrupted.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::error::LockError;
use crate::logging::*;

const ACQUIRE_ATTEMPTS: usize = 3;

struct Held {
	file: File,
	path: PathBuf,
}

type SharedHeld = Arc<Mutex<Option<Held>>>;

/// Exclusive lock on `<tempDir>/<dbName>.lock`
pub struct ProcessLock {
	path: PathBuf,
	held: SharedHeld,
	signal_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProcessLock {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProcessLock")
			.field("path", &self.path)
			.field("held", &self.is_held())
			.finish()
	}
}

impl ProcessLock {
	/// Take the lock, failing immediately if another holder exists
	pub fn acquire(path: &Path) -> Result<ProcessLock, LockError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(|e| io_err(path, "create parent directories", e))?;
		}

		for _ in 0..ACQUIRE_ATTEMPTS {
			let file = open_artifact(path)?;

			match file.try_lock_exclusive() {
				Ok(()) => {}
				Err(e) if is_contended(&e) => {
					return Err(LockError::AlreadyLocked { path: path.display().to_string() });
				}
				Err(e) => return Err(io_err(path, "acquire lock", e)),
			}

			// A releasing holder may have unlinked the file after we opened it
			if !same_file(&file, path) {
				debug!("Lock artifact {} was replaced while locking, retrying", path.display());
				let _ = FileExt::unlock(&file);
				continue;
			}

			// Lock obtained, so any previous content is stale
			let mut file = file;
			file.set_len(0).map_err(|e| io_err(path, "truncate lock file", e))?;
			writeln!(file, "{}", std::process::id())
				.map_err(|e| io_err(path, "write lock file", e))?;

			debug!("Acquired process lock {}", path.display());
			return Ok(ProcessLock {
				path: path.to_path_buf(),
				held: Arc::new(Mutex::new(Some(Held { file, path: path.to_path_buf() }))),
				signal_task: Mutex::new(None),
			});
		}

		Err(LockError::AlreadyLocked { path: path.display().to_string() })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn is_held(&self) -> bool {
		self.held.lock().map(|h| h.is_some()).unwrap_or(false)
	}

	/// Remove the artifact and drop the lock. Safe to call repeatedly.
	///
	/// Also uninstalls the signal handler, so later signals get the default
	/// behaviour again.
	pub fn release(&self) {
		if let Some(task) = self.take_signal_task() {
			task.abort();
		}
		release_held(&self.held);
	}

	/// Release the lock and exit on SIGINT/SIGTERM while the lock is held.
	/// Must be called from within a tokio runtime.
	pub fn release_on_signal(&self) {
		if !self.is_held() {
			return;
		}
		let task = setup_signal_handlers(self.path.clone(), Arc::clone(&self.held));
		let previous = match self.signal_task.lock() {
			Ok(mut guard) => guard.replace(task),
			Err(poisoned) => poisoned.into_inner().replace(task),
		};
		if let Some(previous) = previous {
			previous.abort();
		}
	}

	fn take_signal_task(&self) -> Option<JoinHandle<()>> {
		match self.signal_task.lock() {
			Ok(mut guard) => guard.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		}
	}
}

impl Drop for ProcessLock {
	fn drop(&mut self) {
		self.release();
	}
}

fn release_held(held: &Mutex<Option<Held>>) {
	let taken = match held.lock() {
		Ok(mut guard) => guard.take(),
		Err(poisoned) => poisoned.into_inner().take(),
	};
	if let Some(held) = taken {
		// Unlink before unlocking so a waiter never locks a doomed inode
		if let Err(e) = fs::remove_file(&held.path) {
			if e.kind() != io::ErrorKind::NotFound {
				warn!("Failed to remove lock file {}: {}", held.path.display(), e);
			}
		}
		let _ = FileExt::unlock(&held.file);
		debug!("Released process lock {}", held.path.display());
	}
}

fn open_artifact(path: &Path) -> Result<File, LockError> {
	let open = || OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path);

	match open() {
		Ok(file) => Ok(file),
		Err(first) => {
			// Leftover that is not a usable regular file (crash debris)
			let meta = fs::symlink_metadata(path);
			let removed = match meta {
				Ok(m) if m.is_dir() => fs::remove_dir_all(path).is_ok(),
				Ok(_) => fs::remove_file(path).is_ok(),
				Err(_) => false,
			};
			if removed {
				info!("Removed stale lock artifact {}", path.display());
				open().map_err(|e| io_err(path, "open lock file", e))
			} else {
				Err(io_err(path, "open lock file", first))
			}
		}
	}
}

fn same_file(file: &File, path: &Path) -> bool {
	#[cfg(unix)]
	{
		use std::os::unix::fs::MetadataExt;
		match (file.metadata(), fs::metadata(path)) {
			(Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
			_ => false,
		}
	}
	#[cfg(not(unix))]
	{
		let _ = file;
		path.exists()
	}
}

fn is_contended(e: &io::Error) -> bool {
	e.kind() == io::ErrorKind::WouldBlock
		|| e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn io_err(path: &Path, operation: &str, source: io::Error) -> LockError {
	LockError::Io { path: path.display().to_string(), operation: operation.to_string(), source }
}

/// Setup signal handlers for graceful cleanup on termination
fn setup_signal_handlers(path: PathBuf, held: SharedHeld) -> JoinHandle<()> {
	tokio::spawn(async move {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Lock file may be left behind.", e);
				return;
			}
		};

		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Lock file may be left behind.", e);
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => {
				debug!("Received SIGTERM, releasing {} and exiting", path.display());
				release_held(&held);
				std::process::exit(143); // 128 + SIGTERM(15)
			}
			_ = sigint.recv() => {
				debug!("Received SIGINT, releasing {} and exiting", path.display());
				release_held(&held);
				std::process::exit(130); // 128 + SIGINT(2)
			}
		}
	})
}


// vim: ts=4
