//! Password-keyed block cipher bound to a sequence number.
//!
//! # Key Schedule
//!
//! The first 15 password bytes are zero padded to 16 bytes and read as four
//! little-endian words. The top byte of the last word is reserved: every
//! call replaces it with the sequence number, so each packet of a session is
//! encrypted under its own key.
//!
//! # Wire Layout
//!
//! ```text
//! [0xF8 | (fill - 3)][fill - 1 random bytes][payload][7 zero bytes]
//! ```
//!
//! where `fill = 10 - (len + 1) % 8`, which makes the total a multiple of 8.
//! Blocks are 8 bytes, little endian, chained CBC-style.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum ciphertext length.
pub const MIN_CIPHERTEXT_LEN: usize = 16;

const BLOCK_SIZE: usize = 8;
const TRAILER_LEN: usize = 7;
const ROUNDS: usize = 16;

/// Round constants. The first entry deviates from `0x9e3779b9`; servers use
/// this exact table.
const SUM_TABLE: [u32; ROUNDS] = [
    0x9e35_79b9,
    0x3c6e_f172,
    0xd2a6_6d2b,
    0x78dd_36e4,
    0x17e5_609d,
    0xb54f_da56,
    0x5384_560f,
    0xf1bb_77c8,
    0x8ff2_4781,
    0x2e4a_c13a,
    0xcc65_3af3,
    0x6a99_64ac,
    0x08d1_2965,
    0xa708_081e,
    0x4512_21d7,
    0xe377_93d0,
];

/// A symmetric cipher whose keystream position is a sequence number.
pub trait Cipher: Send + Sync {
    /// Builds the cipher from a password.
    fn from_password(password: &[u8]) -> Self
    where
        Self: Sized;

    /// Encrypts `payload` under sequence number `seq`.
    fn encrypt(&self, payload: &[u8], seq: u8) -> Vec<u8>;

    /// Decrypts `data` under sequence number `seq`.
    ///
    /// Returns `None` if the input is malformed. A wrong key or sequence
    /// number usually yields garbage rather than `None`; callers needing
    /// authentication verify a digest on top.
    fn decrypt(&self, data: &[u8], seq: u8) -> Option<Vec<u8>>;
}

/// Returns the ciphertext length for a payload of `len` bytes.
#[must_use]
pub fn encrypted_len(len: usize) -> usize {
    fill_len(len) + len + TRAILER_LEN
}

fn fill_len(len: usize) -> usize {
    10 - (len + 1) % BLOCK_SIZE
}

/// 16-round TEA variant used by the SimpleDict protocol.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Tea {
    key: [u32; 4],
}

impl Tea {
    fn key_for(&self, seq: u8) -> [u32; 4] {
        let mut key = self.key;
        key[3] |= u32::from(seq) << 24;
        key
    }

    fn encrypt_with(&self, payload: &[u8], seq: u8, fill_random: impl FnOnce(&mut [u8])) -> Vec<u8> {
        let fill = fill_len(payload.len());
        let mut dst = vec![0u8; encrypted_len(payload.len())];

        // fill is in 3..=10, so the header always has room for the pad length.
        dst[0] = ((fill - 3) as u8) | 0xF8;
        fill_random(&mut dst[1..fill]);
        dst[fill..fill + payload.len()].copy_from_slice(payload);

        let key = self.key_for(seq);
        let mut iv1 = 0u64;
        let mut iv2 = 0u64;
        for chunk in dst.chunks_exact_mut(BLOCK_SIZE) {
            let holder = read_block(chunk) ^ iv1;
            let (v0, v1) = encipher(holder, &key);
            iv1 = ((u64::from(v0) << 32) | u64::from(v1)) ^ iv2;
            iv2 = holder;
            chunk.copy_from_slice(&iv1.to_le_bytes());
        }

        dst
    }
}

impl Cipher for Tea {
    fn from_password(password: &[u8]) -> Self {
        let mut raw = [0u8; 16];
        let n = password.len().min(15);
        raw[..n].copy_from_slice(&password[..n]);

        let mut key = [0u32; 4];
        for (word, bytes) in key.iter_mut().zip(raw.chunks_exact(4)) {
            *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        key[3] &= 0x00ff_ffff;
        raw.zeroize();

        Self { key }
    }

    fn encrypt(&self, payload: &[u8], seq: u8) -> Vec<u8> {
        self.encrypt_with(payload, seq, |pad| rand::thread_rng().fill_bytes(pad))
    }

    fn decrypt(&self, data: &[u8], seq: u8) -> Option<Vec<u8>> {
        if data.len() < MIN_CIPHERTEXT_LEN || data.len() % BLOCK_SIZE != 0 {
            return None;
        }

        let key = self.key_for(seq);
        let mut dst = vec![0u8; data.len()];
        let mut iv2 = 0u64;
        let mut holder = 0u64;
        for (src, out) in data
            .chunks_exact(BLOCK_SIZE)
            .zip(dst.chunks_exact_mut(BLOCK_SIZE))
        {
            let iv1 = read_block(src);
            iv2 ^= iv1;
            let (v0, v1) = decipher(iv2, &key);
            iv2 = (u64::from(v0) << 32) | u64::from(v1);
            out.copy_from_slice(&(iv2 ^ holder).to_le_bytes());
            holder = iv1;
        }

        let start = usize::from(dst[0] & 7) + 3;
        let end = data.len() - TRAILER_LEN;
        if end <= start {
            return None;
        }
        Some(dst[start..end].to_vec())
    }
}

impl std::fmt::Debug for Tea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tea").field("key", &"[REDACTED]").finish()
    }
}

fn read_block(chunk: &[u8]) -> u64 {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(chunk);
    u64::from_le_bytes(block)
}

#[inline]
fn mix(v: u32, sum: u32, ka: u32, kb: u32) -> u32 {
    v.wrapping_add(sum) ^ (v << 4).wrapping_add(ka) ^ (v >> 5).wrapping_add(kb)
}

fn encipher(block: u64, key: &[u32; 4]) -> (u32, u32) {
    let mut v0 = (block >> 32) as u32;
    let mut v1 = block as u32;
    for sum in SUM_TABLE {
        v0 = v0.wrapping_add(mix(v1, sum, key[0], key[1]));
        v1 = v1.wrapping_add(mix(v0, sum, key[2], key[3]));
    }
    (v0, v1)
}

fn decipher(block: u64, key: &[u32; 4]) -> (u32, u32) {
    let mut v0 = (block >> 32) as u32;
    let mut v1 = block as u32;
    for sum in SUM_TABLE.into_iter().rev() {
        v1 = v1.wrapping_sub(mix(v0, sum, key[2], key[3]));
        v0 = v0.wrapping_sub(mix(v1, sum, key[0], key[1]));
    }
    (v0, v1)
}
