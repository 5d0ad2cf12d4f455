//! # SimpleDict Protocol
//!
//! Wire-level building blocks shared by the client engine and test servers.
//!
//! - [`Cipher`] / [`Tea`] - password-keyed block cipher whose key is bound to
//!   a per-connection sequence number
//! - [`CmdPacket`] / [`Command`] - the authenticated command frame
//! - [`RecordCodec`] / [`SimpleProtobuf`] - dictionary blob decoding
//!
//! Nothing here performs I/O.
//!
//! ## Example
//!
//! ```rust
//! use sdict_protocol::{Cipher, CmdPacket, Command, Tea};
//!
//! let tea = Tea::from_password(b"query password");
//! let wire = CmdPacket::encode(Command::Cat, b"fill", &tea, 0).unwrap();
//! assert_eq!(CmdPacket::decode(&wire, &tea, 0).as_deref(), Some(&b"fill"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod error;
mod packet;
mod record;

pub use cipher::{encrypted_len, Cipher, Tea, MIN_CIPHERTEXT_LEN};
pub use error::{CodecError, CodecResult};
pub use packet::{fits, CmdPacket, Command, FILLER, HEADER_LEN, MAX_ENCRYPTED_LEN};
pub use record::{get_slle, put_slle, Record, RecordCodec, SimpleProtobuf, SLLE_MAX_BYTES, SLLE_MAX_VALUE};
