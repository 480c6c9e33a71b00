//! Shared fakes and fixtures for integration tests
//!
//! `FakeServer` models the arbitration service in memory. Each client gets
//! its own `FakeArbiter` view of the shared server so tests can count the
//! calls one coordinator made.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use leasesync::access::ACCESS_LIST_FILENAME;
use leasesync::arbitration::{
	ArbitrationClient, ArbitrationError, ArbitrationResult, CheckoutResponse, ProbeResponse,
};
use leasesync::archive::{Archiver, ZipArchiver};
use leasesync::callbacks::{Decider, Notice};
use leasesync::connectivity::FixedConnectivity;
use leasesync::types::{RetryChoice, RetryContext, SaveChoice, WriteChoice};
use leasesync::{ArchiveError, Config, Identity, SessionContext, SyncCoordinator};

pub const DB: &str = "ACM-TEST";

// ===================================================================
// ARBITRATION
// ===================================================================

#[derive(Debug)]
pub struct ServerState {
	pub current: String,
	/// `(key, possessor)` of the outstanding lease
	pub holder: Option<(String, String)>,
	next_key: u64,
}

#[derive(Debug, Clone)]
pub struct FakeServer {
	inner: Arc<Mutex<ServerState>>,
}

impl FakeServer {
	pub fn new(current: &str) -> Self {
		FakeServer {
			inner: Arc::new(Mutex::new(ServerState {
				current: current.to_string(),
				holder: None,
				next_key: 1000,
			})),
		}
	}

	pub fn current(&self) -> String {
		self.inner.lock().unwrap().current.clone()
	}

	pub fn set_current(&self, current: &str) {
		self.inner.lock().unwrap().current = current.to_string();
	}

	pub fn holder(&self) -> Option<(String, String)> {
		self.inner.lock().unwrap().holder.clone()
	}

	/// Mark the lease as held under `key`
	pub fn hold(&self, key: &str, possessor: &str) {
		self.inner.lock().unwrap().holder = Some((key.to_string(), possessor.to_string()));
	}

	/// Hand the lease to someone else behind the client's back
	pub fn steal(&self, possessor: &str) {
		let mut state = self.inner.lock().unwrap();
		state.next_key += 1;
		let key = format!("stolen-{}", state.next_key);
		state.holder = Some((key, possessor.to_string()));
	}

	pub fn arbiter(&self) -> Arc<FakeArbiter> {
		Arc::new(FakeArbiter {
			server: self.clone(),
			calls: AtomicUsize::new(0),
			checkins: AtomicUsize::new(0),
			failures: AtomicUsize::new(0),
			rival: Mutex::new(None),
		})
	}
}

pub struct FakeArbiter {
	server: FakeServer,
	calls: AtomicUsize,
	checkins: AtomicUsize,
	failures: AtomicUsize,
	/// Someone who grabs the lease between our probe and our checkout
	rival: Mutex<Option<String>>,
}

impl FakeArbiter {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn checkins(&self) -> usize {
		self.checkins.load(Ordering::SeqCst)
	}

	/// Make the next `n` calls fail as if the network were down
	pub fn fail_next(&self, n: usize) {
		self.failures.store(n, Ordering::SeqCst);
	}

	/// Let `possessor` take the lease right before this client's next checkout
	pub fn rival_before_checkout(&self, possessor: &str) {
		*self.rival.lock().unwrap() = Some(possessor.to_string());
	}

	fn enter(&self) -> ArbitrationResult<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let pending = self.failures.load(Ordering::SeqCst);
		if pending > 0 {
			self.failures.store(pending - 1, Ordering::SeqCst);
			return Err(ArbitrationError::NetworkUnreachable {
				url: "fake://arbiter".to_string(),
				source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "network down")),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl ArbitrationClient for FakeArbiter {
	async fn probe(&self, _db: &str, _identity: &Identity) -> ArbitrationResult<ProbeResponse> {
		self.enter()?;
		let state = self.server.inner.lock().unwrap();
		let possessor = state.holder.as_ref().map(|(_, who)| who.clone());
		Ok(ProbeResponse {
			available: possessor.is_none(),
			possessor,
			filename: Some(state.current.clone()),
		})
	}

	async fn checkout(&self, _db: &str, identity: &Identity) -> ArbitrationResult<CheckoutResponse> {
		self.enter()?;
		if let Some(rival) = self.rival.lock().unwrap().take() {
			self.server.steal(&rival);
		}
		let mut state = self.server.inner.lock().unwrap();
		let filename = Some(state.current.clone());
		if let Some((_, who)) = &state.holder {
			return Ok(CheckoutResponse::Denied { possessor: who.clone(), filename });
		}
		state.next_key += 1;
		let key = state.next_key.to_string();
		state.holder = Some((key.clone(), identity.display_name()));
		Ok(CheckoutResponse::Granted { key, filename })
	}

	async fn checkin(
		&self,
		_db: &str,
		_identity: &Identity,
		key: &str,
		filename: Option<&str>,
	) -> ArbitrationResult<bool> {
		self.enter()?;
		self.checkins.fetch_add(1, Ordering::SeqCst);
		let mut state = self.server.inner.lock().unwrap();
		let holds = state.holder.as_ref().map(|(k, _)| k == key).unwrap_or(false);
		match filename {
			Some(name) if holds => {
				state.current = name.to_string();
				state.holder = None;
				Ok(true)
			}
			Some(_) => Ok(false),
			None => {
				if holds {
					state.holder = None;
				}
				Ok(true)
			}
		}
	}
}

// ===================================================================
// DECISIONS
// ===================================================================

/// Answers from queues; empty queues fall back to read-write, save, give up
#[derive(Default)]
pub struct ScriptedDecider {
	writes: Mutex<VecDeque<WriteChoice>>,
	saves: Mutex<VecDeque<SaveChoice>>,
	retries: Mutex<VecDeque<RetryChoice>>,
	pub asked_retry: Mutex<Vec<RetryContext>>,
	pub save_prompts: AtomicUsize,
	pub notices: Mutex<Vec<Notice>>,
}

impl ScriptedDecider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn write(self, choice: WriteChoice) -> Self {
		self.writes.lock().unwrap().push_back(choice);
		self
	}

	pub fn save(self, choice: SaveChoice) -> Self {
		self.saves.lock().unwrap().push_back(choice);
		self
	}

	pub fn retry(self, choice: RetryChoice) -> Self {
		self.retries.lock().unwrap().push_back(choice);
		self
	}

	pub fn shared(self) -> Arc<Self> {
		Arc::new(self)
	}

	pub fn notices(&self) -> Vec<Notice> {
		self.notices.lock().unwrap().clone()
	}

	pub fn save_prompts(&self) -> usize {
		self.save_prompts.load(Ordering::SeqCst)
	}

	pub fn retry_contexts(&self) -> Vec<RetryContext> {
		self.asked_retry.lock().unwrap().clone()
	}
}

impl Decider for ScriptedDecider {
	fn confirm_proceed_write_or_demo(&self) -> WriteChoice {
		self.writes.lock().unwrap().pop_front().unwrap_or(WriteChoice::ReadWrite)
	}

	fn confirm_save_or_discard(&self) -> SaveChoice {
		self.save_prompts.fetch_add(1, Ordering::SeqCst);
		self.saves.lock().unwrap().pop_front().unwrap_or(SaveChoice::Save)
	}

	fn confirm_retry_or_abort(&self, context: RetryContext, _message: &str) -> RetryChoice {
		self.asked_retry.lock().unwrap().push(context);
		self.retries.lock().unwrap().pop_front().unwrap_or(RetryChoice::GiveUp)
	}

	fn notify(&self, notice: &Notice) {
		self.notices.lock().unwrap().push(notice.clone());
	}
}

// ===================================================================
// ARCHIVES
// ===================================================================

/// Zip archiver whose next `n` zip attempts fail
#[derive(Default)]
pub struct FlakyArchiver {
	failures: AtomicUsize,
	pub zip_attempts: AtomicUsize,
}

impl FlakyArchiver {
	pub fn failing(n: usize) -> Arc<Self> {
		Arc::new(FlakyArchiver { failures: AtomicUsize::new(n), zip_attempts: AtomicUsize::new(0) })
	}

	pub fn zip_attempts(&self) -> usize {
		self.zip_attempts.load(Ordering::SeqCst)
	}
}

impl Archiver for FlakyArchiver {
	fn zip_dir(&self, source: &Path, archive: &Path) -> Result<(), ArchiveError> {
		self.zip_attempts.fetch_add(1, Ordering::SeqCst);
		let pending = self.failures.load(Ordering::SeqCst);
		if pending > 0 {
			self.failures.store(pending - 1, Ordering::SeqCst);
			return Err(ArchiveError::Io {
				path: archive.display().to_string(),
				source: io::Error::new(io::ErrorKind::Other, "disk full"),
			});
		}
		ZipArchiver.zip_dir(source, archive)
	}

	fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
		ZipArchiver.unzip(archive, dest)
	}
}

// ===================================================================
// FILESYSTEM FIXTURES
// ===================================================================

/// Share root shared by all clients plus one temp dir per client
pub struct Fixture {
	pub root: TempDir,
	pub share: PathBuf,
}

impl Fixture {
	pub fn new() -> Self {
		let root = TempDir::new().unwrap();
		let share = root.path().join("share");
		fs::create_dir_all(&share).unwrap();
		Fixture { root, share }
	}

	pub fn temp_dir(&self, user: &str) -> PathBuf {
		self.root.path().join(format!("temp-{}", user))
	}

	pub fn allow(&self, users: &[&str]) {
		let mut list = users.join("\n");
		list.push('\n');
		fs::write(self.share.join(ACCESS_LIST_FILENAME), list).unwrap();
	}

	/// Write a real snapshot archive holding one `content.txt`
	pub fn snapshot(&self, name: &str, content: &str) -> PathBuf {
		let src = self.root.path().join(format!("build-{}", name));
		fs::create_dir_all(src.join("audio")).unwrap();
		fs::write(src.join("content.txt"), content).unwrap();
		let target = self.share.join(name);
		ZipArchiver.zip_dir(&src, &target).unwrap();
		fs::remove_dir_all(&src).unwrap();
		target
	}

	pub fn config(&self, user: &str) -> Config {
		Config {
			share_root: self.share.clone(),
			temp_dir: self.temp_dir(user),
			db_name: DB.to_string(),
			handle_signals: false,
			..Config::default()
		}
	}

	pub fn context(&self, user: &str) -> SessionContext {
		self.context_with(self.config(user), user)
	}

	pub fn context_with(&self, config: Config, user: &str) -> SessionContext {
		let identity = Identity::new(Some(user), &format!("{}@example.org", user), &format!("pc-{}", user));
		SessionContext::with_identity(config, identity).unwrap()
	}

	pub fn coordinator(
		&self,
		ctx: SessionContext,
		arbiter: &Arc<FakeArbiter>,
		decider: &Arc<ScriptedDecider>,
		online: bool,
	) -> SyncCoordinator {
		SyncCoordinator::builder(ctx)
			.arbiter(arbiter.clone())
			.decider(decider.clone())
			.connectivity(Arc::new(FixedConnectivity(online)))
			.build()
			.unwrap()
	}

	/// Online coordinator with a custom archiver
	pub fn coordinator_with_archiver(
		&self,
		ctx: SessionContext,
		arbiter: &Arc<FakeArbiter>,
		decider: &Arc<ScriptedDecider>,
		archiver: Arc<dyn Archiver>,
	) -> SyncCoordinator {
		SyncCoordinator::builder(ctx)
			.arbiter(arbiter.clone())
			.decider(decider.clone())
			.connectivity(Arc::new(FixedConnectivity(true)))
			.archiver(archiver)
			.build()
			.unwrap()
	}
}

/// Unzip a snapshot and read its `content.txt`
pub fn snapshot_content(path: &Path) -> String {
	let out = TempDir::new().unwrap();
	ZipArchiver.unzip(path, out.path()).unwrap();
	fs::read_to_string(out.path().join("content.txt")).unwrap()
}

// vim: ts=4
