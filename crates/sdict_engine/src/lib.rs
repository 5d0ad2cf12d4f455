//! # SimpleDict Engine
//!
//! Client sessions for SimpleDict servers.
//!
//! This crate provides:
//! - [`SimpleDict`] - an in-memory mirror of a remote dictionary with fetch,
//!   set, delete and search
//! - [`SnapshotCache`] - the on-disk copy of the last downloaded blob, reused
//!   when the server digest is unchanged
//! - [`SimpleKanban`] - the clear-text bulk download / version message protocol
//! - [`UpdateChecker`] - version checks and digest-verified downloads
//! - [`DictWorker`] - a single-owner thread that serves a session to async code
//!
//! ## Fetch Flow
//!
//! 1. Load the cached blob and digest, if any
//! 2. Ask the server whether its digest differs (`MD5`)
//! 3. Unchanged: rebuild the mirror from the cache, purging duplicates
//! 4. Changed, missing or forced: download (`CAT`), rebuild, store the cache
//!
//! ## Key Invariants
//!
//! - Every operation opens and closes its own connection
//! - The mirror only changes after the server confirmed the change
//! - A failed fetch leaves the mirror untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod dict;
mod error;
mod kanban;
mod updater;
mod worker;

pub use cache::{digest, Snapshot, SnapshotCache, DIGEST_FILE, SNAPSHOT_FILE};
pub use config::{
    ClientConfig, DictConfig, KanbanConfig, RetryConfig, DEFAULT_RETRY_DELAY, KANBAN_RETRIES,
};
pub use dict::{
    FetchOutcome, SessionState, SimpleDict, ACK_CHANGED, ACK_DATA, ACK_SUCCESS, MAX_LENGTH_DIGITS,
};
pub use error::{CacheError, CacheResult, DictError, DictResult};
pub use kanban::{SimpleKanban, CAT_BANNER_LEN, GET_BANNER_LEN, NULL_SENTINEL};
pub use updater::{DownloadFailure, UpdateChecker, UpdateHandler, UpdateNotice};
pub use worker::{DictHandle, DictWorker, REQUEST_QUEUE_DEPTH};
