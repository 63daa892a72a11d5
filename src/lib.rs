//! gitnotes - keep a note store in sync across devices through git
//!
//! This crate provides the core functionality for the `gitnotes` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Note, SyncCheckpoint)
//! - [`storage`] - SQLite note store
//! - [`git`] - Repository operations (libgit2)
//! - [`sync`] - File naming registry and the sync cycle
//! - [`config`] - Paths and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};

/// Global silent mode flag for `--silent` output.
///
/// When set, mutating commands print only the note ID (or the new head)
/// instead of full output. Avoids threading a `silent` bool through every
/// handler signature.
pub static SILENT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if silent mode is active.
#[inline]
pub fn is_silent() -> bool {
    SILENT.load(std::sync::atomic::Ordering::Relaxed)
}
