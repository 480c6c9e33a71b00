//! Decision capability injected into the coordinator
//!
//! The coordinator never talks to a UI directly. Every question it needs
//! answered goes through [`Decider`], and every fallback or degraded outcome
//! is announced through [`Decider::notify`].

use crate::types::{RetryChoice, RetryContext, SandboxReason, SaveChoice, WriteChoice};
use std::fmt;

// Type aliases to reduce complexity
type WriteFn = dyn Fn() -> WriteChoice + Send + Sync;
type SaveFn = dyn Fn() -> SaveChoice + Send + Sync;
type RetryFn = dyn Fn(RetryContext, &str) -> RetryChoice + Send + Sync;
type NoticeFn = dyn Fn(&Notice) + Send + Sync;

/// One-way messages the user must see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
	/// Session resumed an earlier checkout
	Recovered { snapshot: String },
	/// Brand-new database; this user was granted write access
	NewDatabase,
	/// Session runs in sandbox mode; changes will not be saved
	Sandbox(SandboxReason),
	/// Zipping the mirror into the share root failed
	ZipFailed { message: String },
	/// Checkin refused; the snapshot was kept in the share root
	CheckinDenied { retained_snapshot: String },
	/// Changes were checked in
	Committed { snapshot: String },
	/// Changes were thrown away
	Discarded,
	/// The lease could not be released on the server
	ReleaseFailed,
	/// Changes kept locally for a later checkin
	Deferred,
}

impl fmt::Display for Notice {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Notice::Recovered { snapshot } => {
				write!(f, "You already have this database checked out ({}); continue making changes", snapshot)
			}
			Notice::NewDatabase => {
				write!(f, "The database does not exist yet; creating it and giving you write access")
			}
			Notice::Sandbox(reason) => write!(
				f,
				"Running in demonstration mode ({}). Your changes will not be saved.",
				reason
			),
			Notice::ZipFailed { message } => {
				write!(f, "There is a problem writing your changes to the shared folder: {}", message)
			}
			Notice::CheckinDenied { retained_snapshot } => write!(
				f,
				"Someone else has taken control of this database, so your changes cannot be checked in. \
				 They are kept in {}.",
				retained_snapshot
			),
			Notice::Committed { snapshot } => write!(
				f,
				"Your changes have been checked in as {}. Stay online until the sync service is up to date.",
				snapshot
			),
			Notice::Discarded => write!(f, "Your changes have been discarded"),
			Notice::ReleaseFailed => write!(
				f,
				"Could not release your checkout. Please try again later so that others can check out this database."
			),
			Notice::Deferred => write!(
				f,
				"Your changes could not be checked in now, but you still have the database checked out \
				 and can submit them later"
			),
		}
	}
}

/// Questions and notices the coordinator sends to its host application
pub trait Decider: Send + Sync {
	/// Update the shared database, run a demo, or abort?
	fn confirm_proceed_write_or_demo(&self) -> WriteChoice;

	/// Save the session's work, discard it, or abort?
	fn confirm_save_or_discard(&self) -> SaveChoice;

	/// A network step failed; retry, give up, or abort?
	fn confirm_retry_or_abort(&self, context: RetryContext, message: &str) -> RetryChoice;

	/// Show a message; must not block on user input
	fn notify(&self, _notice: &Notice) {}
}

/// Non-interactive decider: proceed read-write, save, never retry
///
/// With `force_sandbox` set in the configuration this gives a headless demo
/// session; otherwise a headless read-write session.
pub struct AutoDecider;

impl Decider for AutoDecider {
	fn confirm_proceed_write_or_demo(&self) -> WriteChoice {
		WriteChoice::ReadWrite
	}

	fn confirm_save_or_discard(&self) -> SaveChoice {
		SaveChoice::Save
	}

	fn confirm_retry_or_abort(&self, _context: RetryContext, _message: &str) -> RetryChoice {
		RetryChoice::GiveUp
	}
}

/// Builder for deciders using function closures
///
/// Unset questions fall back to [`AutoDecider`] answers.
pub struct DeciderBuilder {
	write: Option<Box<WriteFn>>,
	save: Option<Box<SaveFn>>,
	retry: Option<Box<RetryFn>>,
	notice: Option<Box<NoticeFn>>,
}

impl DeciderBuilder {
	/// Create a new decider builder
	pub fn new() -> Self {
		DeciderBuilder { write: None, save: None, retry: None, notice: None }
	}

	pub fn on_write_or_demo<F>(mut self, callback: F) -> Self
	where
		F: Fn() -> WriteChoice + Send + Sync + 'static,
	{
		self.write = Some(Box::new(callback));
		self
	}

	pub fn on_save_or_discard<F>(mut self, callback: F) -> Self
	where
		F: Fn() -> SaveChoice + Send + Sync + 'static,
	{
		self.save = Some(Box::new(callback));
		self
	}

	pub fn on_retry<F>(mut self, callback: F) -> Self
	where
		F: Fn(RetryContext, &str) -> RetryChoice + Send + Sync + 'static,
	{
		self.retry = Some(Box::new(callback));
		self
	}

	pub fn on_notice<F>(mut self, callback: F) -> Self
	where
		F: Fn(&Notice) + Send + Sync + 'static,
	{
		self.notice = Some(Box::new(callback));
		self
	}

	/// Build the decider
	pub fn build(self) -> Box<dyn Decider> {
		Box::new(ClosureDecider {
			write: self.write,
			save: self.save,
			retry: self.retry,
			notice: self.notice,
		})
	}
}

impl Default for DeciderBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct ClosureDecider {
	write: Option<Box<WriteFn>>,
	save: Option<Box<SaveFn>>,
	retry: Option<Box<RetryFn>>,
	notice: Option<Box<NoticeFn>>,
}

impl Decider for ClosureDecider {
	fn confirm_proceed_write_or_demo(&self) -> WriteChoice {
		match self.write {
			Some(ref callback) => callback(),
			None => AutoDecider.confirm_proceed_write_or_demo(),
		}
	}

	fn confirm_save_or_discard(&self) -> SaveChoice {
		match self.save {
			Some(ref callback) => callback(),
			None => AutoDecider.confirm_save_or_discard(),
		}
	}

	fn confirm_retry_or_abort(&self, context: RetryContext, message: &str) -> RetryChoice {
		match self.retry {
			Some(ref callback) => callback(context, message),
			None => AutoDecider.confirm_retry_or_abort(context, message),
		}
	}

	fn notify(&self, notice: &Notice) {
		if let Some(ref callback) = self.notice {
			callback(notice);
		}
	}
}


// vim: ts=4
