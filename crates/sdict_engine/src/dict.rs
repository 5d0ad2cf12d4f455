//! Dictionary session: fetch, cache, set and delete over the encrypted
//! command protocol.
//!
//! # Session Lifecycle
//!
//! Every public operation opens its own connection and closes it before
//! returning:
//!
//! ```text
//! Idle → Connecting → ChannelOpen → CommandSent → AwaitingReply → Closing → Idle
//! ```
//!
//! # Sequence Numbers
//!
//! Each connection starts at sequence 0. Every command packet sent and every
//! ack received advances the counter by one. A CAT download is sent at `s`
//! without advancing and its bulk reply is decrypted at `s + 1`, after which
//! the counter moves to `s + 2`. Closing sends END at the current sequence and
//! resets the counter to 0.

use crate::cache::{Snapshot, SnapshotCache};
use crate::config::{DictConfig, RetryConfig};
use crate::error::{DictError, DictResult};
use sdict_io::Transport;
use sdict_protocol::{
    encrypted_len, fits, Cipher, CmdPacket, Command, Record, RecordCodec, SimpleProtobuf, Tea,
    FILLER, HEADER_LEN, MAX_ENCRYPTED_LEN,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Ack text: the server's digest differs from ours.
pub const ACK_CHANGED: &str = "nequ";
/// Ack text: the command succeeded.
pub const ACK_SUCCESS: &str = "succ";
/// Ack text: the server waits for value data.
pub const ACK_DATA: &str = "data";

/// Maximum number of digits in a CAT length prefix.
pub const MAX_LENGTH_DIGITS: usize = 10;

/// The phase of the current logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No operation in progress.
    Idle,
    /// Opening the connection.
    Connecting,
    /// Connected, no command sent yet.
    ChannelOpen,
    /// A command was sent.
    CommandSent,
    /// Waiting for an ack or payload.
    AwaitingReply,
    /// Sending END and closing.
    Closing,
}

impl SessionState {
    /// Returns true while a connection is in use.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// Where fetched data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Downloaded from the server.
    Downloaded {
        /// Number of entries in the rebuilt mirror.
        entries: usize,
    },
    /// Reused from the snapshot cache.
    Cached {
        /// Number of entries in the rebuilt mirror.
        entries: usize,
    },
}

impl FetchOutcome {
    /// Number of entries in the rebuilt mirror.
    pub fn entries(&self) -> usize {
        match self {
            FetchOutcome::Downloaded { entries } | FetchOutcome::Cached { entries } => *entries,
        }
    }

    /// Returns true if the snapshot cache was used.
    pub fn is_cached(&self) -> bool {
        matches!(self, FetchOutcome::Cached { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Read,
    Write,
}

/// How a blob is turned into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    /// Fresh download: later duplicates overwrite earlier ones.
    Verify,
    /// Cached blob: only the first occurrence of a key is kept.
    Dedup,
}

/// A client for a remote SimpleDict server.
///
/// Holds an in-memory mirror of the remote dictionary plus the order in which
/// keys were last fetched. All operations are blocking and take `&mut self`;
/// share a session across tasks through [`DictWorker`](crate::DictWorker).
///
/// # Invariants
///
/// - The mirror is rebuilt wholesale by every successful fetch
/// - The recency list holds each mirrored key at most once
/// - A connection never outlives the operation that opened it
/// - The sequence counter is 0 whenever no operation is running
pub struct SimpleDict<C: Cipher = Tea, R: RecordCodec = SimpleProtobuf> {
    transport: Transport,
    read_key: C,
    write_key: Option<C>,
    codec: R,
    cache: SnapshotCache,
    fetch_retry: RetryConfig,
    seq: u8,
    state: SessionState,
    entries: HashMap<String, String>,
    latest: Vec<String>,
}

impl SimpleDict {
    /// Creates a session using the TEA cipher and simple protobuf records.
    pub fn new(transport: Transport, config: DictConfig) -> Self {
        let read_key = Tea::from_password(config.password.as_bytes());
        let write_key = config
            .set_password
            .as_deref()
            .map(|p| Tea::from_password(p.as_bytes()));
        Self::with_parts(
            transport,
            read_key,
            write_key,
            SimpleProtobuf,
            SnapshotCache::new(config.cache_dir),
            config.fetch_retry,
        )
    }
}

impl<C: Cipher, R: RecordCodec> SimpleDict<C, R> {
    /// Creates a session from explicit collaborators.
    pub fn with_parts(
        transport: Transport,
        read_key: C,
        write_key: Option<C>,
        codec: R,
        cache: SnapshotCache,
        fetch_retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            read_key,
            write_key,
            codec,
            cache,
            fetch_retry,
            seq: 0,
            state: SessionState::Idle,
            entries: HashMap::new(),
            latest: Vec::new(),
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the current sequence number.
    pub fn sequence(&self) -> u8 {
        self.seq
    }

    /// Returns true if mutations are possible.
    pub fn can_write(&self) -> bool {
        self.write_key.is_some()
    }

    /// Returns the snapshot cache.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Number of mirrored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the mirror is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over mirrored keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Keys in the order the last fetch produced them.
    pub fn latest_keys(&self) -> &[String] {
        &self.latest
    }

    /// Looks up a key in the mirror. Never touches the network.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the entries whose value satisfies `predicate`.
    pub fn filter_values(&self, predicate: impl Fn(&str) -> bool) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter(|(_, value)| predicate(value.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Finds keys whose key or value contains `text`, ignoring case.
    ///
    /// Results follow the recency list. Keys set since the last fetch are not
    /// in that list yet; they come last, sorted.
    pub fn search(&self, text: &str) -> Vec<String> {
        let needle = text.to_lowercase();
        let is_match = |key: &str| {
            key.to_lowercase().contains(&needle)
                || self
                    .entries
                    .get(key)
                    .is_some_and(|value| value.to_lowercase().contains(&needle))
        };

        let mut found: Vec<String> = self
            .latest
            .iter()
            .filter(|key| is_match(key.as_str()))
            .cloned()
            .collect();

        let mut unlisted: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !self.latest.contains(*key) && is_match(key.as_str()))
            .cloned()
            .collect();
        unlisted.sort();
        found.extend(unlisted);
        found
    }

    /// Loads the dictionary from the cache or the server.
    ///
    /// Unless `force` is set, a cached snapshot is checked against the
    /// server digest first and reused when unchanged. Otherwise the whole
    /// dictionary is downloaded, retrying failed connects and reads.
    ///
    /// On success the mirror and recency list are rebuilt. On failure they
    /// are left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::FetchFailed`] when retries are exhausted, or
    /// [`DictError::Decrypt`] when the downloaded blob does not decrypt.
    pub fn fetch(&mut self, force: bool) -> DictResult<FetchOutcome> {
        if !force {
            if let Some(snapshot) = self.load_snapshot() {
                if !self.has_new_item(&snapshot.digest) {
                    self.rebuild(&snapshot.blob, ParseMode::Dedup);
                    info!(entries = self.len(), "dictionary unchanged, using cache");
                    return Ok(FetchOutcome::Cached {
                        entries: self.len(),
                    });
                }
            }
        }

        let blob = self.download()?;
        self.rebuild(&blob, ParseMode::Verify);
        if let Err(e) = self.cache.store(&blob) {
            warn!(error = %e, "failed to save dictionary snapshot");
        }
        info!(entries = self.len(), bytes = blob.len(), "dictionary downloaded");
        Ok(FetchOutcome::Downloaded {
            entries: self.len(),
        })
    }

    /// Callback form of [`fetch`](Self::fetch).
    ///
    /// Exactly one of `on_failure` / `on_success` runs, then `on_common`.
    pub fn fetch_with(
        &mut self,
        force: bool,
        on_failure: impl FnOnce(&DictError),
        on_success: impl FnOnce(&FetchOutcome),
        on_common: impl FnOnce(),
    ) -> DictResult<FetchOutcome> {
        let result = self.fetch(force);
        match &result {
            Ok(outcome) => on_success(outcome),
            Err(e) => on_failure(e),
        }
        on_common();
        result
    }

    /// Deletes `key` remotely, then from the mirror and recency list.
    ///
    /// # Errors
    ///
    /// Fails without touching local state if there is no write key, the
    /// server does not answer `succ`, or the connection does not close
    /// cleanly.
    pub fn del(&mut self, key: &str) -> DictResult<()> {
        self.send_del(key.as_bytes())?;

        self.entries.remove(key);
        if let Some(index) = self.latest.iter().position(|k| k == key) {
            self.latest.remove(index);
        }
        info!(key, "deleted");
        Ok(())
    }

    /// Sets `key` to `value` remotely, then in the mirror.
    ///
    /// An existing key is deleted remotely first so the server holds a single
    /// record for it. The recency list is not changed.
    ///
    /// # Errors
    ///
    /// Fails if there is no write key, the key or value is too large, the
    /// preliminary delete fails, or an ack is wrong. If the value was
    /// accepted but the connection did not close cleanly, the mirror is
    /// already updated and [`DictError::CloseFailed`] is returned.
    pub fn set(&mut self, key: &str, value: &str) -> DictResult<()> {
        self.require_write_key()?;
        check_fits(key.as_bytes())?;
        check_fits(value.as_bytes())?;

        if self.entries.contains_key(key) {
            self.send_del(key.as_bytes())?;
        }

        let ((), closed) = self.exchange(|this| {
            this.send_command(Command::Set, key.as_bytes(), Key::Write)?;
            this.expect_ack(ACK_DATA)?;
            this.send_command(Command::Dat, value.as_bytes(), Key::Write)?;
            this.expect_ack(ACK_SUCCESS)?;
            this.entries.insert(key.to_owned(), value.to_owned());
            Ok(())
        })?;
        require_closed(closed)?;

        info!(key, "set");
        Ok(())
    }

    /// Deletes a raw key on the server without touching local state.
    fn send_del(&mut self, raw_key: &[u8]) -> DictResult<()> {
        self.require_write_key()?;
        check_fits(raw_key)?;

        let ((), closed) = self.exchange(|this| {
            this.send_command(Command::Del, raw_key, Key::Write)?;
            this.expect_ack(ACK_SUCCESS)
        })?;
        require_closed(closed)
    }

    fn has_new_item(&mut self, digest: &[u8; 16]) -> bool {
        let result = self.exchange(|this| {
            this.send_command(Command::Md5, digest, Key::Read)?;
            Ok(this.read_ack())
        });

        match result {
            Ok((ack, _)) => {
                debug!(ack = ?ack, "check md5");
                ack.as_deref() == Some(ACK_CHANGED)
            }
            Err(e) => {
                warn!(error = %e, "digest check failed, assuming unchanged");
                false
            }
        }
    }

    fn download(&mut self) -> DictResult<Vec<u8>> {
        let attempts = self.fetch_retry.attempts();

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.fetch_retry.delay_for_attempt(attempt));
            }

            match self.download_once() {
                Ok(blob) => return Ok(blob),
                Err(e) if e.is_retryable() => {
                    warn!(attempt = attempt + 1, error = %e, "download failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(DictError::FetchFailed { attempts })
    }

    fn download_once(&mut self) -> DictResult<Vec<u8>> {
        let (blob, _) = self.exchange(|this| {
            let seq = this.seq;
            this.send_packet(Command::Cat, FILLER, Key::Read)?;

            let len = this.read_length_prefix()?;
            debug!(len, "cat length");
            let data = this
                .transport
                .receive(len, false)
                .ok_or(DictError::ReceiveFailed)?;

            let blob = this
                .read_key
                .decrypt(&data, seq.wrapping_add(1))
                .ok_or(DictError::Decrypt)?;
            this.seq = seq.wrapping_add(2);
            Ok(blob)
        })?;
        Ok(blob)
    }

    fn read_length_prefix(&mut self) -> DictResult<usize> {
        let mut digits = String::new();
        loop {
            let byte = self.transport.read_byte().ok_or(DictError::ReceiveFailed)?;
            if !byte.is_ascii_digit() {
                break;
            }
            if digits.len() == MAX_LENGTH_DIGITS {
                return Err(DictError::ReceiveFailed);
            }
            digits.push(char::from(byte));
        }
        let len = digits.parse().map_err(|_| DictError::ReceiveFailed)?;
        if len == 0 {
            return Err(DictError::Decrypt);
        }
        Ok(len)
    }

    fn load_snapshot(&self) -> Option<Snapshot> {
        match self.cache.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable snapshot cache");
                None
            }
        }
    }

    fn rebuild(&mut self, blob: &[u8], mode: ParseMode) {
        self.entries.clear();
        self.latest.clear();

        let (records, error) = self.codec.decode_lossy(blob);
        if let Some(e) = error {
            warn!(error = %e, decoded = records.len(), "dictionary blob is malformed");
        }

        for Record { key, value } in records {
            let key = match String::from_utf8(key) {
                Ok(key) => key,
                Err(e) => {
                    self.cleanup(e.as_bytes(), "corrupt key");
                    continue;
                }
            };
            let value = String::from_utf8_lossy(&value).into_owned();

            match mode {
                ParseMode::Verify => {
                    if self.entries.insert(key.clone(), value).is_some() {
                        if let Some(index) = self.latest.iter().position(|k| *k == key) {
                            self.latest.remove(index);
                        }
                    }
                    self.latest.push(key);
                }
                ParseMode::Dedup => {
                    if self.entries.contains_key(&key) {
                        self.cleanup(key.as_bytes(), "duplicate key");
                    } else {
                        self.entries.insert(key.clone(), value);
                        self.latest.push(key);
                    }
                }
            }
        }
    }

    fn cleanup(&mut self, raw_key: &[u8], reason: &str) {
        match self.send_del(raw_key) {
            Ok(()) => info!(reason, key = %String::from_utf8_lossy(raw_key), "purged record"),
            Err(e) => warn!(reason, error = %e, "failed to purge record"),
        }
    }

    fn require_write_key(&self) -> DictResult<()> {
        if self.write_key.is_some() {
            Ok(())
        } else {
            Err(DictError::NoWriteKey)
        }
    }

    fn cipher(&self, key: Key) -> DictResult<&C> {
        match key {
            Key::Read => Ok(&self.read_key),
            Key::Write => self.write_key.as_ref().ok_or(DictError::NoWriteKey),
        }
    }

    /// Opens a channel, runs `body`, and always closes the channel.
    ///
    /// Returns the body's value together with whether the close was clean.
    fn exchange<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> DictResult<T>,
    ) -> DictResult<(T, bool)> {
        self.state = SessionState::Connecting;
        if !self.transport.connect() {
            self.state = SessionState::Idle;
            return Err(DictError::ConnectFailed);
        }
        self.seq = 0;
        self.state = SessionState::ChannelOpen;

        let result = body(self);
        let closed = self.close_channel();
        result.map(|value| (value, closed))
    }

    fn close_channel(&mut self) -> bool {
        self.state = SessionState::Closing;
        match CmdPacket::encode(Command::End, FILLER, &self.read_key, self.seq) {
            Ok(packet) => {
                self.transport.send(Some(&packet));
            }
            Err(e) => warn!(error = %e, "failed to encode END"),
        }
        self.seq = 0;
        let closed = self.transport.close();
        self.state = SessionState::Idle;
        closed
    }

    /// Sends a packet at the current sequence without advancing it.
    fn send_packet(&mut self, command: Command, payload: &[u8], key: Key) -> DictResult<()> {
        let packet = CmdPacket::encode(command, payload, self.cipher(key)?, self.seq)?;
        if !self.transport.send(Some(&packet)) {
            return Err(DictError::SendFailed);
        }
        self.state = SessionState::CommandSent;
        Ok(())
    }

    /// Sends a packet and advances the sequence.
    fn send_command(&mut self, command: Command, payload: &[u8], key: Key) -> DictResult<()> {
        let result = self.send_packet(command, payload, key);
        self.seq = self.seq.wrapping_add(1);
        result
    }

    /// Reads one ack frame and decrypts it with the read key.
    fn read_ack(&mut self) -> Option<String> {
        self.state = SessionState::AwaitingReply;

        let mut frame = self.transport.receive(HEADER_LEN, false)?;
        let len = usize::from(frame[1]);
        if len == 0 {
            debug!("ack without payload");
            return None;
        }
        frame.extend(self.transport.receive(len, false)?);

        let plain = CmdPacket::decode(&frame, &self.read_key, self.seq)?;
        self.seq = self.seq.wrapping_add(1);

        let text = String::from_utf8_lossy(&plain).into_owned();
        debug!(ack = %text, "ack");
        Some(text)
    }

    fn expect_ack(&mut self, expected: &'static str) -> DictResult<()> {
        match self.read_ack() {
            Some(ack) if ack == expected => Ok(()),
            actual => Err(DictError::UnexpectedAck { expected, actual }),
        }
    }
}

impl<C: Cipher, R: RecordCodec> std::fmt::Debug for SimpleDict<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleDict")
            .field("transport", &self.transport)
            .field("can_write", &self.can_write())
            .field("cache", &self.cache)
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn check_fits(payload: &[u8]) -> DictResult<()> {
    if fits(payload.len()) {
        Ok(())
    } else {
        Err(DictError::PayloadTooLarge {
            len: encrypted_len(payload.len()),
            max: MAX_ENCRYPTED_LEN,
        })
    }
}

fn require_closed(closed: bool) -> DictResult<()> {
    if closed {
        Ok(())
    } else {
        Err(DictError::CloseFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdict_io::TransportConfig;
    use std::cell::RefCell;
    use std::net::TcpListener;
    use std::time::Duration;

    fn unreachable_transport() -> Transport {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        Transport::new(
            TransportConfig::new("127.0.0.1", port)
                .with_connect_timeout(Duration::from_millis(200))
                .with_connect_retries(0),
        )
    }

    fn offline_dict(config: DictConfig) -> SimpleDict {
        SimpleDict::new(
            unreachable_transport(),
            config.with_fetch_retry(RetryConfig::no_retry()),
        )
    }

    fn loaded_dict(records: &[Record]) -> SimpleDict {
        let mut dict = offline_dict(DictConfig::new("pw"));
        let blob = SimpleProtobuf.encode(records).unwrap();
        dict.rebuild(&blob, ParseMode::Verify);
        dict
    }

    #[test]
    fn sequence_advances_with_every_command_and_ack() {
        use sdict_testkit::prelude::*;

        let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), Vec::new());
        let mut dict = SimpleDict::new(
            Transport::new(server.transport_config()),
            DictConfig::new(READ_PASSWORD).with_set_password(WRITE_PASSWORD),
        );

        let (seen, closed) = dict
            .exchange(|this| {
                let mut seen = vec![this.seq];
                this.send_command(Command::Set, b"key", Key::Write)?;
                seen.push(this.seq);
                this.expect_ack(ACK_DATA)?;
                seen.push(this.seq);
                this.send_command(Command::Dat, b"value", Key::Write)?;
                seen.push(this.seq);
                this.expect_ack(ACK_SUCCESS)?;
                seen.push(this.seq);
                Ok(seen)
            })
            .unwrap();

        assert_eq!(seen, [0, 1, 2, 3, 4]);
        assert!(closed);
        assert_eq!(dict.sequence(), 0);
        assert_eq!(server.state().value("key").as_deref(), Some("value"));
    }

    #[test]
    fn fetch_outcome_accessors() {
        let outcome = FetchOutcome::Cached { entries: 4 };
        assert!(outcome.is_cached());
        assert_eq!(outcome.entries(), 4);
        assert!(!FetchOutcome::Downloaded { entries: 0 }.is_cached());
    }

    #[test]
    fn mutations_without_write_key_fail() {
        let mut dict = offline_dict(DictConfig::new("pw"));
        assert!(!dict.can_write());

        assert!(matches!(dict.set("k", "v"), Err(DictError::NoWriteKey)));
        assert!(matches!(dict.del("k"), Err(DictError::NoWriteKey)));
        assert!(dict.is_empty());
        assert_eq!(dict.state(), SessionState::Idle);
    }

    #[test]
    fn oversized_value_rejected_before_connecting() {
        let mut dict = offline_dict(DictConfig::new("pw").with_set_password("w"));

        let err = dict.set("k", &"v".repeat(300)).unwrap_err();
        assert!(matches!(err, DictError::PayloadTooLarge { max: 255, .. }));
    }

    #[test]
    fn unreachable_server_fails_fetch() {
        let mut dict = offline_dict(DictConfig::new("pw"));

        let err = dict.fetch(false).unwrap_err();
        assert!(matches!(err, DictError::FetchFailed { attempts: 1 }));
        assert_eq!(dict.state(), SessionState::Idle);
        assert_eq!(dict.sequence(), 0);
    }

    #[test]
    fn failed_fetch_keeps_mirror() {
        let mut dict = loaded_dict(&[Record::new("a", "1")]);
        assert!(dict.fetch(true).is_err());
        assert_eq!(dict.get("a"), Some("1"));
    }

    #[test]
    fn fetch_with_runs_callbacks_in_order() {
        let mut dict = offline_dict(DictConfig::new("pw"));
        let calls = RefCell::new(Vec::new());

        let result = dict.fetch_with(
            false,
            |_| calls.borrow_mut().push("failure"),
            |_| calls.borrow_mut().push("success"),
            || calls.borrow_mut().push("common"),
        );
        assert!(result.is_err());
        assert_eq!(calls.into_inner(), vec!["failure", "common"]);
    }

    #[test]
    fn verify_mode_overwrites_and_moves_duplicates() {
        let dict = loaded_dict(&[
            Record::new("a", "1"),
            Record::new("b", "2"),
            Record::new("a", "3"),
        ]);

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("a"), Some("3"));
        assert_eq!(dict.latest_keys(), ["b", "a"]);
    }

    #[test]
    fn verify_mode_drops_corrupt_keys() {
        let dict = loaded_dict(&[
            Record::new(vec![0xff, 0xfe], "bad"),
            Record::new("ok", "fine"),
        ]);

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.latest_keys(), ["ok"]);
    }

    #[test]
    fn dedup_mode_keeps_first_occurrence() {
        let mut dict = offline_dict(DictConfig::new("pw"));
        let blob = SimpleProtobuf
            .encode(&[
                Record::new("a", "1"),
                Record::new("b", "2"),
                Record::new("a", "3"),
            ])
            .unwrap();
        dict.rebuild(&blob, ParseMode::Dedup);

        assert_eq!(dict.get("a"), Some("1"));
        assert_eq!(dict.latest_keys(), ["a", "b"]);
    }

    #[test]
    fn truncated_blob_keeps_prefix() {
        let mut dict = offline_dict(DictConfig::new("pw"));
        let blob = SimpleProtobuf
            .encode(&[Record::new("a", "1"), Record::new("b", "2")])
            .unwrap();
        dict.rebuild(&blob[..blob.len() - 1], ParseMode::Verify);

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("a"), Some("1"));
    }

    #[test]
    fn search_matches_keys_and_values_case_insensitively() {
        let mut dict = loaded_dict(&[
            Record::new("Apple", "fruit"),
            Record::new("carrot", "Vegetable"),
            Record::new("pineapple", "FRUIT"),
        ]);
        dict.entries.insert("zapple".into(), "unlisted".into());

        assert_eq!(dict.search("APPLE"), vec!["Apple", "pineapple", "zapple"]);
        assert_eq!(dict.search("fruit"), vec!["Apple", "pineapple"]);
        assert_eq!(dict.search("veg"), vec!["carrot"]);
        assert!(dict.search("nothing").is_empty());
    }

    #[test]
    fn filter_values_selects_by_value() {
        let dict = loaded_dict(&[Record::new("a", "keep"), Record::new("b", "drop")]);

        let kept = dict.filter_values(|v| v == "keep");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("a").map(String::as_str), Some("keep"));
    }

    #[test]
    fn length_prefix_limits() {
        assert!(check_fits(&[0u8; 238]).is_ok());
        assert!(matches!(
            check_fits(&[0u8; 239]),
            Err(DictError::PayloadTooLarge { len: 256, max: 255 })
        ));
    }
}
