//! # SimpleDict Testkit
//!
//! Test utilities for SimpleDict clients.
//!
//! This crate provides:
//! - [`FakeDictServer`] - a loopback server for the encrypted dictionary protocol
//! - [`FakeKanbanServer`] - a loopback server for the kanban protocol
//! - Fixtures: sample records and temporary cache directories
//!
//! Both servers handle one connection at a time and expose their state for
//! assertions and fault injection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sdict_testkit::prelude::*;
//!
//! let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
//! let transport = Transport::new(server.transport_config());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dict_server;
pub mod fixtures;
pub mod kanban_server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dict_server::*;
    pub use crate::fixtures::*;
    pub use crate::kanban_server::*;
}

pub use dict_server::{FakeDictServer, ServerState};
pub use fixtures::*;
pub use kanban_server::{FakeKanbanServer, KanbanState, WELCOME};
