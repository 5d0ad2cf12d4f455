//! # SimpleDict I/O
//!
//! Byte-reliable socket plumbing for the SimpleDict client.
//!
//! This crate provides the two lowest layers of the client:
//! - [`ByteQueue`] - an unbounded FIFO byte buffer with partial dequeue and drain
//! - [`Transport`] - one blocking TCP connection at a time, with
//!   connect-with-retry, raw send, accumulate-until-size receive and
//!   optional progress reporting
//!
//! ## Failure Model
//!
//! The transport never propagates I/O errors to its caller. Every failure is
//! logged through `tracing` and degraded to a `bool` or `Option` result.
//! Retry policy for whole operations lives one layer up, in the protocol
//! sessions.
//!
//! ## Example
//!
//! ```rust
//! use sdict_io::ByteQueue;
//!
//! let mut queue = ByteQueue::new();
//! queue.enqueue(&[1, 2, 3]);
//! assert_eq!(queue.dequeue(2).as_deref(), Some(&[1, 2][..]));
//! assert_eq!(queue.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod progress;
mod queue;
mod transport;

pub use config::TransportConfig;
pub use progress::Progress;
pub use queue::ByteQueue;
pub use transport::{ConnectionState, Transport, RECEIVE_BUFFER_SIZE};
