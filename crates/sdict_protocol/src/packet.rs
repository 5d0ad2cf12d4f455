//! Command packets.
//!
//! ```text
//! [0]      command code
//! [1]      encrypted payload length N
//! [2..18]  MD5 of the plaintext payload
//! [18..]   N bytes of encrypted payload
//! ```

use crate::cipher::{encrypted_len, Cipher};
use crate::error::{CodecError, CodecResult};
use md5::{Digest, Md5};
use tracing::debug;

/// Length of the fixed packet header.
pub const HEADER_LEN: usize = 18;

/// Maximum encrypted payload length, bounded by the 1-byte length field.
pub const MAX_ENCRYPTED_LEN: usize = u8::MAX as usize;

/// Payload sent with commands that carry no data.
pub const FILLER: &[u8] = b"fill";

/// Protocol command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Look up a value by key.
    Get = 0,
    /// Download the whole dictionary.
    Cat = 1,
    /// Compare the dictionary digest.
    Md5 = 2,
    /// Acknowledgement from the server.
    Ack = 3,
    /// End of session.
    End = 4,
    /// Start setting a key.
    Set = 5,
    /// Delete a key.
    Del = 6,
    /// Value data following [`Command::Set`].
    Dat = 7,
}

impl Command {
    /// Returns the wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Get),
            1 => Ok(Self::Cat),
            2 => Ok(Self::Md5),
            3 => Ok(Self::Ack),
            4 => Ok(Self::End),
            5 => Ok(Self::Set),
            6 => Ok(Self::Del),
            7 => Ok(Self::Dat),
            other => Err(CodecError::UnknownCommand(other)),
        }
    }
}

/// Returns true if a payload of `len` bytes fits in one packet.
#[must_use]
pub fn fits(len: usize) -> bool {
    encrypted_len(len) <= MAX_ENCRYPTED_LEN
}

/// A command packet with an encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdPacket {
    command: Command,
    digest: [u8; 16],
    data: Vec<u8>,
}

impl CmdPacket {
    /// Encrypts `payload` into a packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PacketTooLarge`] if the encrypted payload does
    /// not fit in the length byte.
    pub fn seal<C: Cipher + ?Sized>(
        command: Command,
        payload: &[u8],
        cipher: &C,
        seq: u8,
    ) -> CodecResult<Self> {
        let len = encrypted_len(payload.len());
        if len > MAX_ENCRYPTED_LEN {
            return Err(CodecError::PacketTooLarge {
                len,
                max: MAX_ENCRYPTED_LEN,
            });
        }

        let digest: [u8; 16] = Md5::digest(payload).into();
        Ok(Self {
            command,
            digest,
            data: cipher.encrypt(payload, seq),
        })
    }

    /// Splits a raw packet into its fields without decrypting.
    ///
    /// # Errors
    ///
    /// Fails on a short packet, an unknown command code, or a length byte
    /// that disagrees with the body.
    pub fn parse(raw: &[u8]) -> CodecResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(CodecError::PacketTooShort { len: raw.len() });
        }
        let command = Command::try_from(raw[0])?;
        let declared = usize::from(raw[1]);
        let data = &raw[HEADER_LEN..];
        if declared != data.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let mut digest = [0u8; 16];
        digest.copy_from_slice(&raw[2..HEADER_LEN]);
        Ok(Self {
            command,
            digest,
            data: data.to_vec(),
        })
    }

    /// Returns the command.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Returns the encrypted payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decrypts the payload and checks it against the digest.
    pub fn open<C: Cipher + ?Sized>(&self, cipher: &C, seq: u8) -> Option<Vec<u8>> {
        let plain = cipher.decrypt(&self.data, seq)?;
        let digest: [u8; 16] = Md5::digest(&plain).into();
        if digest != self.digest {
            debug!(seq, "packet digest mismatch");
            return None;
        }
        Some(plain)
    }

    /// Serializes the packet.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.push(self.command.code());
        // seal and parse both bound the length to one byte.
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.data);
        out
    }

    /// Encrypts and serializes in one step.
    ///
    /// # Errors
    ///
    /// See [`seal`](Self::seal).
    pub fn encode<C: Cipher + ?Sized>(
        command: Command,
        payload: &[u8],
        cipher: &C,
        seq: u8,
    ) -> CodecResult<Vec<u8>> {
        Ok(Self::seal(command, payload, cipher, seq)?.to_bytes())
    }

    /// Parses and opens a raw packet.
    ///
    /// Returns `None` when the packet is malformed or fails verification.
    pub fn decode<C: Cipher + ?Sized>(raw: &[u8], cipher: &C, seq: u8) -> Option<Vec<u8>> {
        match Self::parse(raw) {
            Ok(packet) => packet.open(cipher, seq),
            Err(e) => {
                debug!(error = %e, "malformed packet");
                None
            }
        }
    }
}
