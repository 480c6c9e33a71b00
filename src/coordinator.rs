//! Checkout/checkin session state machine
//!
//! ```text
//! Start → LockAcquired → {Recovering | Negotiating} → MirrorReady → Active
//!       → Committing → Done                      (Fatal from any state)
//! ```
//!
//! The coordinator is the only component that knows the whole protocol. It
//! owns the process lock for the lifetime of the session, persists the lease
//! record the moment a lease is granted, and turns every recoverable
//! negotiation failure into a sandbox session instead of an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::access::AccessList;
use crate::arbitration::{ArbitrationClient, ArbitrationError, CheckoutResponse, HttpArbitrationClient};
use crate::archive::{self, Archiver, ZipArchiver};
use crate::callbacks::{AutoDecider, Decider, Notice};
use crate::connectivity::{ConnectivityProbe, HttpConnectivityProbe};
use crate::error::CheckoutError;
use crate::logging::*;
use crate::session::SessionContext;
use crate::snapshot::{SnapshotName, NOT_CREATED_SENTINEL};
use crate::state::{LeaseRecord, LeaseStore};
use crate::types::{
	AccessMode, CommitOutcome, CoordinatorState, OpenOutcome, OpenStatus, RetryChoice, RetryContext,
	SandboxReason, SaveChoice, WriteChoice,
};
use crate::utils::lock::ProcessLock;

/// What negotiation decided the session will be
enum Plan {
	ReadWrite { record: LeaseRecord, status: OpenStatus },
	Sandbox { reason: SandboxReason, source: Option<PathBuf>, snapshot: String },
}

/// The open session
#[derive(Debug, Clone)]
struct ActiveSession {
	mode: AccessMode,
	lease: Option<LeaseRecord>,
}

/// Builder for [`SyncCoordinator`]; unset collaborators get the
/// HTTP/zip/non-interactive defaults
pub struct CoordinatorBuilder {
	ctx: SessionContext,
	arbiter: Option<Arc<dyn ArbitrationClient>>,
	connectivity: Option<Arc<dyn ConnectivityProbe>>,
	archiver: Option<Arc<dyn Archiver>>,
	decider: Option<Arc<dyn Decider>>,
}

impl CoordinatorBuilder {
	pub fn arbiter(mut self, arbiter: Arc<dyn ArbitrationClient>) -> Self {
		self.arbiter = Some(arbiter);
		self
	}

	pub fn connectivity(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
		self.connectivity = Some(probe);
		self
	}

	pub fn archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
		self.archiver = Some(archiver);
		self
	}

	pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
		self.decider = Some(decider);
		self
	}

	pub fn build(self) -> Result<SyncCoordinator, CheckoutError> {
		let arbiter = match self.arbiter {
			Some(a) => a,
			None => Arc::new(HttpArbitrationClient::from_config(&self.ctx.config)?),
		};
		let connectivity = self
			.connectivity
			.unwrap_or_else(|| Arc::new(HttpConnectivityProbe::from_config(&self.ctx.config)));
		let archiver = self.archiver.unwrap_or_else(|| Arc::new(ZipArchiver));
		let decider = self.decider.unwrap_or_else(|| Arc::new(AutoDecider));

		Ok(SyncCoordinator {
			store: LeaseStore::new(self.ctx.paths.lease.clone()),
			access: AccessList::new(self.ctx.share_root()),
			ctx: self.ctx,
			arbiter,
			connectivity,
			archiver,
			decider,
			lock: None,
			state: CoordinatorState::Start,
			session: None,
		})
	}
}

/// Drives one checkout session from startup to shutdown
pub struct SyncCoordinator {
	ctx: SessionContext,
	arbiter: Arc<dyn ArbitrationClient>,
	connectivity: Arc<dyn ConnectivityProbe>,
	archiver: Arc<dyn Archiver>,
	decider: Arc<dyn Decider>,
	store: LeaseStore,
	access: AccessList,
	lock: Option<ProcessLock>,
	state: CoordinatorState,
	session: Option<ActiveSession>,
}

impl SyncCoordinator {
	pub fn builder(ctx: SessionContext) -> CoordinatorBuilder {
		CoordinatorBuilder { ctx, arbiter: None, connectivity: None, archiver: None, decider: None }
	}

	pub fn state(&self) -> CoordinatorState {
		self.state
	}

	pub fn context(&self) -> &SessionContext {
		&self.ctx
	}

	/// Directory the application reads and writes while the session is open
	pub fn mirror_root(&self) -> &Path {
		&self.ctx.paths.mirror
	}

	/// Access mode, once open
	pub fn mode(&self) -> Option<&AccessMode> {
		self.session.as_ref().map(|s| &s.mode)
	}

	/// Lease held by this session, if any
	pub fn lease(&self) -> Option<&LeaseRecord> {
		self.session.as_ref().and_then(|s| s.lease.as_ref())
	}

	/// True unless a read-write session is open
	pub fn is_read_only(&self) -> bool {
		!matches!(self.mode(), Some(AccessMode::ReadWrite))
	}

	pub fn is_sandbox(&self) -> bool {
		matches!(self.mode(), Some(AccessMode::Sandbox(_)))
	}

	// ========================================================================
	// OPEN
	// ========================================================================

	/// Acquire the process lock, recover or negotiate a lease, and
	/// materialize the mirror
	///
	/// On error the process lock is released and the coordinator is left in
	/// [`CoordinatorState::Fatal`].
	pub async fn open(&mut self) -> Result<OpenOutcome, CheckoutError> {
		if self.state != CoordinatorState::Start {
			return Err(CheckoutError::InvalidState {
				message: format!("open called in state {}", self.state),
			});
		}

		match self.open_inner().await {
			Ok(outcome) => {
				self.transition(CoordinatorState::Active);
				info!(
					db = %self.ctx.db_name(),
					snapshot = %outcome.snapshot,
					read_only = self.is_read_only(),
					"Session open"
				);
				Ok(outcome)
			}
			Err(e) => {
				error!("Cannot open {}: {}", self.ctx.db_name(), e);
				self.transition(CoordinatorState::Fatal);
				self.release_lock();
				Err(e)
			}
		}
	}

	async fn open_inner(&mut self) -> Result<OpenOutcome, CheckoutError> {
		// ─── PHASE 1: Process lock ───
		let lock = ProcessLock::acquire(&self.ctx.paths.lock)?;
		if self.ctx.config.handle_signals {
			lock.release_on_signal();
		}
		self.lock = Some(lock);
		self.transition(CoordinatorState::LockAcquired);

		// ─── PHASE 2: Recovery ───
		if let Some(record) = self.store.load_if_present()? {
			if record.held {
				self.transition(CoordinatorState::Recovering);
				if self.ctx.config.force_sandbox {
					return Err(CheckoutError::PreviouslyCheckedOut { current: record.current_filename });
				}
				return self.resume(record).await;
			}
			debug!("Clearing lease record that is not held");
			self.store.clear()?;
		}

		// ─── PHASE 3: Negotiation ───
		self.transition(CoordinatorState::Negotiating);
		self.remove_stale_mirror().await?;
		let plan = self.negotiate().await?;

		// ─── PHASE 4: Mirror ───
		self.materialize(plan).await
	}

	/// Continue a lease persisted by an earlier session without asking the
	/// arbitration service anything
	async fn resume(&mut self, record: LeaseRecord) -> Result<OpenOutcome, CheckoutError> {
		info!(
			current = %record.current_filename,
			next = %record.next_filename,
			"Recovering checkout from {}",
			self.store.path().display()
		);
		self.transition(CoordinatorState::MirrorReady);

		if dir_has_entries(self.mirror_root()).await? {
			debug!("Reusing existing mirror {}", self.mirror_root().display());
		} else {
			let source = self.local_snapshot_path(&record.current_filename)?;
			if let Some(ref path) = source {
				if !path.is_file() {
					return Err(CheckoutError::NoSnapshotAvailable {
						expected: record.current_filename.clone(),
						share_root: self.ctx.share_root().display().to_string(),
					});
				}
			}
			self.populate_mirror(source).await?;
		}

		self.decider.notify(&Notice::Recovered { snapshot: record.current_filename.clone() });
		let snapshot = record.current_filename.clone();
		self.session = Some(ActiveSession { mode: AccessMode::ReadWrite, lease: Some(record) });
		Ok(OpenOutcome { status: OpenStatus::Recovered, mode: AccessMode::ReadWrite, snapshot })
	}

	async fn negotiate(&mut self) -> Result<Plan, CheckoutError> {
		let db = self.ctx.db_name().to_string();

		if !self.connectivity.is_online().await {
			return match self.ctx.naming.most_recent_snapshot(self.ctx.share_root())? {
				Some(file) => Ok(Plan::Sandbox {
					reason: SandboxReason::Offline,
					snapshot: file.id.to_string(),
					source: Some(file.path),
				}),
				None => Err(CheckoutError::NoSnapshotAvailableOffline {
					share_root: self.ctx.share_root().display().to_string(),
				}),
			};
		}

		let probe = loop {
			match self.arbiter.probe(&db, &self.ctx.identity).await {
				Ok(p) => break p,
				Err(e) => match self.ask_retry(RetryContext::Probe, &e) {
					RetryChoice::Retry => continue,
					RetryChoice::GiveUp => {
						return self.fallback_plan(SandboxReason::ArbitrationUnreachable)
					}
					RetryChoice::Abort => return Err(CheckoutError::Aborted),
				},
			}
		};
		debug!(available = probe.available, filename = ?probe.filename, "Status check");

		let reported = probe.filename.clone().unwrap_or_default();
		let current = match self.ctx.naming.parse(&reported) {
			Ok(name) => name,
			Err(e) => {
				warn!("{}; falling back to the newest local snapshot", e);
				return self.fallback_plan(SandboxReason::MalformedSnapshotName { name: reported });
			}
		};

		let is_new = current.is_not_created();
		let outdated = !is_new && !self.ctx.naming.snapshot_exists(&current, self.ctx.share_root());
		if outdated && self.ctx.naming.most_recent_snapshot(self.ctx.share_root())?.is_none() {
			return Err(CheckoutError::NoSnapshotAvailable {
				expected: current.to_string(),
				share_root: self.ctx.share_root().display().to_string(),
			});
		}

		// ─── Denial conditions ───
		if self.ctx.config.force_sandbox {
			return self.sandbox_plan(SandboxReason::Forced, &current);
		}
		if let Some(possessor) = probe.possessor {
			return self.sandbox_plan(SandboxReason::ArbitrationDenied { possessor: Some(possessor) }, &current);
		}
		if !self.ensure_write_access().await? {
			return self.sandbox_plan(SandboxReason::NoWriteAccess, &current);
		}
		if outdated {
			return self.sandbox_plan(SandboxReason::OutdatedMirror { expected: current.to_string() }, &current);
		}

		match self.decider.confirm_proceed_write_or_demo() {
			WriteChoice::ReadWrite => self.checkout(&current).await,
			WriteChoice::Demo => self.sandbox_plan(SandboxReason::UserChoseDemo, &current),
			WriteChoice::Abort => Err(CheckoutError::Aborted),
		}
	}

	/// Access-list check, seeding the list for a brand-new empty share root
	async fn ensure_write_access(&self) -> Result<bool, CheckoutError> {
		if self.access.has_write_access(&self.ctx.identity).await {
			return Ok(true);
		}
		let empty = self.access.share_root_is_empty().await?;
		Ok(self.access.seed_if_empty(empty, &self.ctx.identity).await)
	}

	async fn checkout(&mut self, current: &SnapshotName) -> Result<Plan, CheckoutError> {
		let db = self.ctx.db_name().to_string();

		let response = loop {
			match self.arbiter.checkout(&db, &self.ctx.identity).await {
				Ok(r) => break r,
				Err(e) => match self.ask_retry(RetryContext::Checkout, &e) {
					RetryChoice::Retry => continue,
					RetryChoice::GiveUp => {
						return self.sandbox_plan(SandboxReason::ArbitrationUnreachable, current)
					}
					RetryChoice::Abort => return Err(CheckoutError::Aborted),
				},
			}
		};

		let (key, granted_name) = match response {
			CheckoutResponse::Denied { possessor, .. } => {
				let reason = SandboxReason::ArbitrationDenied { possessor: Some(possessor) };
				return self.sandbox_plan(reason, current);
			}
			CheckoutResponse::Granted { key, filename } => (key, filename),
		};

		// The grant's filename is authoritative when present
		let granted = match granted_name {
			Some(name) => match self.ctx.naming.parse(&name) {
				Ok(parsed) => parsed,
				Err(e) => {
					warn!("Granted lease names {}; releasing it", e);
					self.release_fresh_lease(&key).await;
					return self.fallback_plan(SandboxReason::MalformedSnapshotName { name });
				}
			},
			None => current.clone(),
		};
		let next = match &granted {
			SnapshotName::NotCreated => self.ctx.naming.first(),
			SnapshotName::Version(id) => match id.next() {
				Ok(next) => next,
				Err(e) => {
					warn!("{}; releasing lease", e);
					self.release_fresh_lease(&key).await;
					return self.fallback_plan(SandboxReason::MalformedSnapshotName { name: granted.to_string() });
				}
			},
		};

		let record = LeaseRecord {
			held: true,
			key,
			current_filename: granted.to_string(),
			next_filename: next.to_string(),
		};
		if let Err(e) = self.store.persist(&record) {
			error!("Cannot persist lease record: {}", e);
			self.release_fresh_lease(&record.key).await;
			return Err(e.into());
		}
		info!(key = %record.key, current = %record.current_filename, "Lease granted and recorded");

		if !granted.is_not_created() && !self.ctx.naming.snapshot_exists(&granted, self.ctx.share_root()) {
			warn!("Granted snapshot {} is not here yet; releasing lease", granted);
			if self.release_fresh_lease(&record.key).await {
				self.store.clear()?;
			}
			let reason = SandboxReason::OutdatedMirror { expected: granted.to_string() };
			return self.sandbox_plan(reason, &granted);
		}

		let status = if granted.is_not_created() { OpenStatus::NewDatabase } else { OpenStatus::CheckedOut };
		Ok(Plan::ReadWrite { record, status })
	}

	/// Discard a lease we cannot use; returns whether the server confirmed
	async fn release_fresh_lease(&self, key: &str) -> bool {
		match self.arbiter.checkin(self.ctx.db_name(), &self.ctx.identity, key, None).await {
			Ok(_) => true,
			Err(e) => {
				warn!("Cannot release lease {}: {}", key, e);
				self.decider.notify(&Notice::ReleaseFailed);
				false
			}
		}
	}

	/// Sandbox on `current` when it is here, else on the newest local snapshot
	fn sandbox_plan(&self, reason: SandboxReason, current: &SnapshotName) -> Result<Plan, CheckoutError> {
		match current {
			SnapshotName::NotCreated => Ok(Plan::Sandbox {
				reason,
				source: None,
				snapshot: NOT_CREATED_SENTINEL.to_string(),
			}),
			SnapshotName::Version(id) => {
				let path = self.ctx.share_root().join(id.file_name());
				if path.is_file() {
					Ok(Plan::Sandbox { reason, source: Some(path), snapshot: id.to_string() })
				} else {
					self.fallback_plan(reason)
				}
			}
		}
	}

	/// Sandbox on the newest local snapshot
	fn fallback_plan(&self, reason: SandboxReason) -> Result<Plan, CheckoutError> {
		match self.ctx.naming.most_recent_snapshot(self.ctx.share_root())? {
			Some(file) => Ok(Plan::Sandbox { reason, snapshot: file.id.to_string(), source: Some(file.path) }),
			None => Err(CheckoutError::NoSnapshotAvailableOffline {
				share_root: self.ctx.share_root().display().to_string(),
			}),
		}
	}

	async fn materialize(&mut self, plan: Plan) -> Result<OpenOutcome, CheckoutError> {
		self.transition(CoordinatorState::MirrorReady);

		match plan {
			Plan::ReadWrite { record, status } => {
				let source = self.local_snapshot_path(&record.current_filename)?;
				self.populate_mirror(source).await?;
				if status == OpenStatus::NewDatabase {
					self.decider.notify(&Notice::NewDatabase);
				}
				let snapshot = record.current_filename.clone();
				self.session = Some(ActiveSession { mode: AccessMode::ReadWrite, lease: Some(record) });
				Ok(OpenOutcome { status, mode: AccessMode::ReadWrite, snapshot })
			}
			Plan::Sandbox { reason, source, snapshot } => {
				warn!("Opening {} in sandbox mode: {}", self.ctx.db_name(), reason);
				self.populate_mirror(source).await?;
				self.decider.notify(&Notice::Sandbox(reason.clone()));
				let mode = AccessMode::Sandbox(reason);
				self.session = Some(ActiveSession { mode: mode.clone(), lease: None });
				Ok(OpenOutcome { status: OpenStatus::Sandboxed, mode, snapshot })
			}
		}
	}

	/// Path of a snapshot in the share root; `None` for a new database
	fn local_snapshot_path(&self, name: &str) -> Result<Option<PathBuf>, CheckoutError> {
		match self.ctx.naming.parse(name)? {
			SnapshotName::NotCreated => Ok(None),
			SnapshotName::Version(id) => Ok(Some(self.ctx.share_root().join(id.file_name()))),
		}
	}

	/// Unzip `source` into the mirror, or create an empty mirror
	async fn populate_mirror(&self, source: Option<PathBuf>) -> Result<(), CheckoutError> {
		let mirror = self.mirror_root().to_path_buf();
		match source {
			Some(archive) => {
				debug!("Unzipping {} into {}", archive.display(), mirror.display());
				archive::unzip_blocking(Arc::clone(&self.archiver), archive, mirror).await?;
			}
			None => fs::create_dir_all(&mirror).await?,
		}
		Ok(())
	}

	async fn remove_stale_mirror(&self) -> Result<(), CheckoutError> {
		match fs::remove_dir_all(self.mirror_root()).await {
			Ok(()) => {
				info!("Removed stale mirror {}", self.mirror_root().display());
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	// ========================================================================
	// SHUTDOWN
	// ========================================================================

	/// Commit or discard the session's work and release the process lock
	pub async fn shutdown_and_commit(&mut self) -> Result<CommitOutcome, CheckoutError> {
		if self.state != CoordinatorState::Active {
			return Err(CheckoutError::InvalidState {
				message: format!("shutdown called in state {}", self.state),
			});
		}
		let session = self.session.take().ok_or_else(|| CheckoutError::InvalidState {
			message: "no open session".to_string(),
		})?;
		self.transition(CoordinatorState::Committing);

		let result = match (session.mode, session.lease) {
			(AccessMode::ReadWrite, Some(lease)) => self.commit(lease).await,
			_ => {
				self.remove_mirror().await;
				Ok(CommitOutcome::NothingToCommit)
			}
		};

		match result {
			Ok(ref outcome) => {
				info!(db = %self.ctx.db_name(), outcome = ?outcome, "Session closed");
				self.transition(CoordinatorState::Done);
			}
			Err(ref e) => {
				error!("Shutdown of {} failed: {}", self.ctx.db_name(), e);
				self.transition(CoordinatorState::Fatal);
			}
		}
		self.release_lock();
		result
	}

	async fn commit(&mut self, lease: LeaseRecord) -> Result<CommitOutcome, CheckoutError> {
		loop {
			match self.decider.confirm_save_or_discard() {
				SaveChoice::Abort => return Ok(self.defer()),
				SaveChoice::Discard => return self.discard(&lease).await,
				SaveChoice::Save => {
					let target = self.ctx.share_root().join(&lease.next_filename);
					let zipped = archive::zip_dir_blocking(
						Arc::clone(&self.archiver),
						self.mirror_root().to_path_buf(),
						target,
					)
					.await;
					match zipped {
						Ok(()) => return self.check_in(&lease).await,
						Err(e) => {
							warn!("Zipping {} failed: {}", lease.next_filename, e);
							self.decider.notify(&Notice::ZipFailed { message: e.to_string() });
						}
					}
				}
			}
		}
	}

	async fn check_in(&mut self, lease: &LeaseRecord) -> Result<CommitOutcome, CheckoutError> {
		let db = self.ctx.db_name().to_string();
		loop {
			let result =
				self.arbiter.checkin(&db, &self.ctx.identity, &lease.key, Some(lease.next_filename.as_str())).await;
			match result {
				Ok(true) => {
					self.remove_previous_snapshot(&lease.current_filename);
					self.store.clear()?;
					self.remove_mirror().await;
					info!("Checked in {}", lease.next_filename);
					self.decider.notify(&Notice::Committed { snapshot: lease.next_filename.clone() });
					return Ok(CommitOutcome::Committed { snapshot: lease.next_filename.clone() });
				}
				Ok(false) => {
					self.store.clear()?;
					self.remove_mirror().await;
					warn!("Checkin of {} denied; snapshot kept in the share root", lease.next_filename);
					self.decider.notify(&Notice::CheckinDenied {
						retained_snapshot: lease.next_filename.clone(),
					});
					return Ok(CommitOutcome::CheckinDenied { retained_snapshot: lease.next_filename.clone() });
				}
				Err(e) => match self.ask_retry(RetryContext::Checkin, &e) {
					RetryChoice::Retry => continue,
					RetryChoice::GiveUp | RetryChoice::Abort => return Ok(self.defer()),
				},
			}
		}
	}

	async fn discard(&mut self, lease: &LeaseRecord) -> Result<CommitOutcome, CheckoutError> {
		let db = self.ctx.db_name().to_string();
		loop {
			match self.arbiter.checkin(&db, &self.ctx.identity, &lease.key, None).await {
				Ok(_) => {
					self.store.clear()?;
					self.remove_mirror().await;
					info!("Discarded checkout of {}", lease.current_filename);
					self.decider.notify(&Notice::Discarded);
					return Ok(CommitOutcome::Discarded);
				}
				Err(e) => match self.ask_retry(RetryContext::Discard, &e) {
					RetryChoice::Retry => continue,
					RetryChoice::GiveUp => {
						self.store.clear()?;
						self.remove_mirror().await;
						warn!("Gave up releasing lease {}; it stays held on the server", lease.key);
						self.decider.notify(&Notice::ReleaseFailed);
						return Ok(CommitOutcome::DiscardUnconfirmed);
					}
					RetryChoice::Abort => return Ok(self.defer()),
				},
			}
		}
	}

	/// Keep lease record and mirror for the next session
	fn defer(&self) -> CommitOutcome {
		warn!("Keeping checkout of {} for a later session", self.ctx.db_name());
		self.decider.notify(&Notice::Deferred);
		CommitOutcome::Deferred
	}

	fn remove_previous_snapshot(&self, current: &str) {
		let removed = self
			.ctx
			.naming
			.parse(current)
			.map_err(|e| e.to_string())
			.and_then(|name| {
				self.ctx.naming.remove_snapshot(&name, self.ctx.share_root()).map_err(|e| e.to_string())
			});
		match removed {
			Ok(true) => debug!("Removed superseded snapshot {}", current),
			Ok(false) => {}
			Err(e) => warn!("Cannot remove superseded snapshot {}: {}", current, e),
		}
	}

	async fn remove_mirror(&self) {
		match fs::remove_dir_all(self.mirror_root()).await {
			Ok(()) => debug!("Removed mirror {}", self.mirror_root().display()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => warn!("Cannot remove mirror {}: {}", self.mirror_root().display(), e),
		}
	}

	// ========================================================================
	// HELPERS
	// ========================================================================

	fn ask_retry(&self, context: RetryContext, e: &ArbitrationError) -> RetryChoice {
		warn!("{:?} failed: {}", context, e);
		self.decider.confirm_retry_or_abort(context, &e.to_string())
	}

	fn transition(&mut self, next: CoordinatorState) {
		debug!("{} → {}", self.state, next);
		self.state = next;
	}

	fn release_lock(&mut self) {
		if let Some(lock) = self.lock.take() {
			lock.release();
		}
	}
}

async fn dir_has_entries(path: &Path) -> Result<bool, CheckoutError> {
	match fs::read_dir(path).await {
		Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(e.into()),
	}
}

// vim: ts=4
