//! Core of a Git LFS lock manager.
//!
//! Parses `git-lfs locks` into a [`locks::LockTable`], refreshes it in the
//! background for any number of subscribers, builds filtered file trees for
//! the lock and unlock views, and plans chunked `git-lfs lock`/`unlock`
//! invocations.

pub mod error;
pub mod locks;
pub mod manager;
pub mod planner;
pub mod selection;
pub mod settings;
pub mod sources;
pub mod tree;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::LockError;
pub use manager::LockManager;
