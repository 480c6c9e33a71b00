//! Utility modules for common functionality

pub mod lock;
pub mod terminal;

// Re-export commonly used items
pub use lock::ProcessLock;
pub use terminal::TerminalDecider;

// vim: ts=4
