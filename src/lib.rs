//! # leasesync - Single-Writer Checkout for Synced Folders
//!
//! leasesync lets many machines share one file-based database that lives in
//! a folder replicated by a cloud file-sync service. The sync service has no
//! locking, so leasesync adds it: a remote arbitration service grants at most
//! one checkout lease per database, the database travels as versioned zip
//! snapshots (`db1.zip`, `db2.zip`, ...), and a per-machine process lock keeps
//! two local instances apart.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leasesync::{Config, SessionContext, SyncCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = SessionContext::from_config(Config::default())?;
//!     let mut coordinator = SyncCoordinator::builder(ctx).build()?;
//!
//!     let opened = coordinator.open().await?;
//!     println!("Working in {} ({:?})", coordinator.mirror_root().display(), opened.mode);
//!
//!     // ... application edits files under mirror_root() ...
//!
//!     let outcome = coordinator.shutdown_and_commit().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Injected Collaborators
//!
//! The coordinator never talks to a UI or the network directly. Replace any
//! of the defaults through the builder:
//!
//! ```rust,ignore
//! let coordinator = SyncCoordinator::builder(ctx)
//!     .decider(Arc::new(TerminalDecider::new()))
//!     .connectivity(Arc::new(FixedConnectivity(false)))
//!     .build()?;
//! ```

pub mod access;
pub mod arbitration;
pub mod archive;
pub mod callbacks;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use callbacks::{AutoDecider, Decider, DeciderBuilder, Notice};
pub use config::Config;
pub use coordinator::{CoordinatorBuilder, SyncCoordinator};
pub use error::{ArchiveError, CheckoutError, ConfigError, LockError, SnapshotError, StateError};
pub use session::{Identity, SessionContext};
pub use types::{AccessMode, CommitOutcome, CoordinatorState, OpenOutcome, OpenStatus, SandboxReason};

// vim: ts=4
