//! Dictionary record codec.
//!
//! A dictionary blob is a plain concatenation of records:
//!
//! ```text
//! [struct_len][type][key_len][key][type][data_len][data]
//! ```
//!
//! Every length and type tag is an SLLE varint: 7 value bits per byte, least
//! significant group first, MSB set on every byte but the last, at most 4
//! bytes. The struct length and type tags are skipped when decoding.

use crate::error::{CodecError, CodecResult};

/// Maximum encoded varint width.
pub const SLLE_MAX_BYTES: usize = 4;

/// Largest value an SLLE varint can carry.
pub const SLLE_MAX_VALUE: usize = (1 << (7 * SLLE_MAX_BYTES)) - 1;

const KEY_TAG: usize = 0x0a;
const DATA_TAG: usize = 0x12;

/// A raw key/value pair as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key bytes, expected to be UTF-8.
    pub key: Vec<u8>,
    /// Value bytes, expected to be UTF-8.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a record.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Converts a dictionary blob to records and back.
pub trait RecordCodec: Send + Sync {
    /// Decodes as many whole records as possible.
    ///
    /// Returns the decoded prefix together with the error that stopped
    /// decoding, if any.
    fn decode_lossy(&self, blob: &[u8]) -> (Vec<Record>, Option<CodecError>);

    /// Decodes every record, failing on any malformed input.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error.
    fn decode(&self, blob: &[u8]) -> CodecResult<Vec<Record>> {
        match self.decode_lossy(blob) {
            (records, None) => Ok(records),
            (_, Some(e)) => Err(e),
        }
    }

    /// Encodes records into a blob.
    ///
    /// # Errors
    ///
    /// Fails if a field is too long for its length varint.
    fn encode(&self, records: &[Record]) -> CodecResult<Vec<u8>>;
}

/// The "simple protobuf" record layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleProtobuf;

impl RecordCodec for SimpleProtobuf {
    fn decode_lossy(&self, blob: &[u8]) -> (Vec<Record>, Option<CodecError>) {
        let mut records = Vec::new();
        let mut reader = Reader { blob, offset: 0 };
        while reader.offset < blob.len() {
            match reader.record() {
                Ok(record) => records.push(record),
                Err(e) => return (records, Some(e)),
            }
        }
        (records, None)
    }

    fn encode(&self, records: &[Record]) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        for record in records {
            let mut body = Vec::with_capacity(record.key.len() + record.value.len() + 8);
            put_slle(&mut body, KEY_TAG)?;
            put_slle(&mut body, record.key.len())?;
            body.extend_from_slice(&record.key);
            put_slle(&mut body, DATA_TAG)?;
            put_slle(&mut body, record.value.len())?;
            body.extend_from_slice(&record.value);

            put_slle(&mut out, body.len())?;
            out.extend_from_slice(&body);
        }
        Ok(out)
    }
}

struct Reader<'a> {
    blob: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn record(&mut self) -> CodecResult<Record> {
        self.slle()?; // struct length
        self.slle()?; // key type
        let key_len = self.slle()?;
        let key = self.bytes(key_len)?;
        self.slle()?; // data type
        let data_len = self.slle()?;
        let value = self.bytes(data_len)?;
        Ok(Record { key, value })
    }

    fn slle(&mut self) -> CodecResult<usize> {
        let (value, len) = get_slle(self.blob, self.offset)?;
        self.offset += len;
        Ok(value)
    }

    fn bytes(&mut self, len: usize) -> CodecResult<Vec<u8>> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.blob.len())
            .ok_or(CodecError::UnexpectedEof {
                offset: self.blob.len(),
            })?;
        let out = self.blob[self.offset..end].to_vec();
        self.offset = end;
        Ok(out)
    }
}

/// Reads an SLLE varint at `start`, returning the value and its width.
///
/// # Errors
///
/// Fails if input ends early or the varint is wider than 4 bytes.
pub fn get_slle(buf: &[u8], start: usize) -> CodecResult<(usize, usize)> {
    let mut value = 0usize;
    for i in 0..SLLE_MAX_BYTES {
        let byte = *buf
            .get(start + i)
            .ok_or(CodecError::UnexpectedEof { offset: start + i })?;
        value |= usize::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::MalformedVarint { offset: start })
}

/// Appends `value` as an SLLE varint.
///
/// # Errors
///
/// Returns [`CodecError::VarintOverflow`] above [`SLLE_MAX_VALUE`].
pub fn put_slle(out: &mut Vec<u8>, value: usize) -> CodecResult<()> {
    if value > SLLE_MAX_VALUE {
        return Err(CodecError::VarintOverflow { value });
    }
    let mut rest = value;
    loop {
        let byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return Ok(());
        }
        out.push(byte | 0x80);
    }
}
