//! Session states and outcome types shared by the coordinator and its callers

use std::fmt;

/// Coordinator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
	Start,
	LockAcquired,
	Recovering,
	Negotiating,
	MirrorReady,
	Active,
	Committing,
	Done,
	Fatal,
}

impl fmt::Display for CoordinatorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			CoordinatorState::Start => "start",
			CoordinatorState::LockAcquired => "lock-acquired",
			CoordinatorState::Recovering => "recovering",
			CoordinatorState::Negotiating => "negotiating",
			CoordinatorState::MirrorReady => "mirror-ready",
			CoordinatorState::Active => "active",
			CoordinatorState::Committing => "committing",
			CoordinatorState::Done => "done",
			CoordinatorState::Fatal => "fatal",
		};
		write!(f, "{}", name)
	}
}

/// Why a session runs in sandbox (demo) mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxReason {
	/// Connectivity probe failed; opened the newest local snapshot
	Offline,
	/// Arbitration service could not be reached and the user gave up retrying
	ArbitrationUnreachable,
	/// Another client holds the lease
	ArbitrationDenied { possessor: Option<String> },
	/// User is not on the access list
	NoWriteAccess,
	/// The snapshot the server considers current has not synced here yet
	OutdatedMirror { expected: String },
	/// The server reported a name that is not a valid snapshot name
	MalformedSnapshotName { name: String },
	/// The user picked demo mode
	UserChoseDemo,
	/// Configuration forces sandbox mode
	Forced,
}

impl fmt::Display for SandboxReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SandboxReason::Offline => write!(f, "cannot reach the server"),
			SandboxReason::ArbitrationUnreachable => {
				write!(f, "the arbitration service is unavailable")
			}
			SandboxReason::ArbitrationDenied { possessor: Some(p) } => {
				write!(f, "another user currently has write access: {}", p)
			}
			SandboxReason::ArbitrationDenied { possessor: None } => {
				write!(f, "another user currently has write access")
			}
			SandboxReason::NoWriteAccess => write!(f, "you do not have write access"),
			SandboxReason::OutdatedMirror { expected } => {
				write!(f, "the latest version ({}) has not yet arrived on this computer", expected)
			}
			SandboxReason::MalformedSnapshotName { name } => {
				write!(f, "the server reported an unusable snapshot name ({})", name)
			}
			SandboxReason::UserChoseDemo => write!(f, "demo mode was selected"),
			SandboxReason::Forced => write!(f, "sandbox mode is forced by configuration"),
		}
	}
}

/// Access mode a session was opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessMode {
	/// Lease held; changes are committed back at shutdown
	ReadWrite,
	/// Local-only; changes are thrown away at shutdown
	Sandbox(SandboxReason),
}

/// How a session came to be open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStatus {
	/// Resumed a lease persisted by an earlier, unfinished session
	Recovered,
	/// Fresh checkout granted by the arbitration service
	CheckedOut,
	/// Fresh checkout of a database that has no snapshot yet
	NewDatabase,
	/// Opened without a lease
	Sandboxed,
}

/// Result of a successful open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
	pub status: OpenStatus,
	pub mode: AccessMode,
	/// Snapshot the mirror was materialized from (`NULL` for a new database)
	pub snapshot: String,
}

/// Result of shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
	/// New snapshot written and checked in
	Committed { snapshot: String },
	/// Lease released without a new snapshot
	Discarded,
	/// User gave up on releasing the lease; local record cleared regardless
	DiscardUnconfirmed,
	/// Server refused the checkin; the written snapshot is kept in the share root
	CheckinDenied { retained_snapshot: String },
	/// Nothing changed: lease and mirror kept for the next session
	Deferred,
	/// Sandbox session, nothing to commit
	NothingToCommit,
}

/// Answer to "update the shared database or run a demo?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteChoice {
	ReadWrite,
	Demo,
	Abort,
}

/// Answer to "save your work or throw it away?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveChoice {
	Save,
	Discard,
	Abort,
}

/// Answer to "try again?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryChoice {
	Retry,
	/// Stop retrying and take the safe fallback for this step
	GiveUp,
	Abort,
}

/// Which step failed when asking to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryContext {
	/// Status probe during negotiation (give up ⇒ sandbox)
	Probe,
	/// Checkout request (give up ⇒ sandbox)
	Checkout,
	/// Checkin of a new snapshot (give up ⇒ keep lease for later)
	Checkin,
	/// Discard of the lease (give up ⇒ forget the lease locally)
	Discard,
}

// vim: ts=4
