//! Kanban session: the unencrypted, length-prefixed sibling protocol used for
//! version checks and bulk downloads.
//!
//! Every exchange is one message, `password + command [+ args] + "quit"`,
//! answered by a fixed banner, a 4-byte little-endian length (or the literal
//! `null`) and the payload.

use crate::config::KanbanConfig;
use crate::error::{DictError, DictResult};
use sdict_io::{Progress, Transport};
use tracing::{debug, info, warn};

/// Banner length after a `cat` command.
pub const CAT_BANNER_LEN: usize = 33;
/// Banner length after a `get` command.
pub const GET_BANNER_LEN: usize = 36;
/// Length header meaning "no data".
pub const NULL_SENTINEL: &[u8; 4] = b"null";

/// Client for a kanban server.
pub struct SimpleKanban {
    transport: Transport,
    config: KanbanConfig,
}

impl SimpleKanban {
    /// Creates a session.
    pub fn new(transport: Transport, config: KanbanConfig) -> Self {
        Self { transport, config }
    }

    /// Installs a progress listener for [`fetch`](Self::fetch).
    pub fn set_progress(&mut self, listener: impl Progress + 'static) {
        self.transport.set_progress(listener);
    }

    /// Removes the progress listener.
    pub fn clear_progress(&mut self) {
        self.transport.clear_progress();
    }

    /// Downloads the kanban blob.
    ///
    /// Connect and read failures are retried; the connection is closed after
    /// every attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::EmptyPayload`] if the server has nothing to send
    /// and [`DictError::FetchFailed`] when retries are exhausted.
    pub fn fetch(&mut self) -> DictResult<Vec<u8>> {
        let attempts = self.config.retry.attempts();

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.config.retry.delay_for_attempt(attempt));
            }

            match self.fetch_once() {
                Ok(data) => {
                    info!(bytes = data.len(), "kanban downloaded");
                    return Ok(data);
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt = attempt + 1, error = %e, "kanban download failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(DictError::FetchFailed { attempts })
    }

    /// Callback form of [`fetch`](Self::fetch).
    pub fn fetch_with(&mut self, on_failure: impl FnOnce(&DictError), on_success: impl FnOnce(&[u8])) {
        match self.fetch() {
            Ok(data) => on_success(&data),
            Err(e) => on_failure(&e),
        }
    }

    /// Fetches the message the server holds for `version`.
    ///
    /// Returns `None` for the `null` sentinel, an empty payload, or any
    /// connection failure.
    pub fn get(&mut self, version: u32) -> Option<String> {
        if !self.transport.connect() {
            return None;
        }
        let result = self.read_message(version);
        self.transport.close();
        result
    }

    fn fetch_once(&mut self) -> DictResult<Vec<u8>> {
        if !self.transport.connect() {
            return Err(DictError::ConnectFailed);
        }
        let result = self.read_blob();
        self.transport.close();
        result
    }

    fn read_blob(&mut self) -> DictResult<Vec<u8>> {
        self.send_command("cat")?;
        self.transport
            .receive(CAT_BANNER_LEN, false)
            .ok_or(DictError::ReceiveFailed)?;

        let len = self.read_length()?.ok_or(DictError::EmptyPayload)?;
        debug!(len, "raw length");
        if len == 0 {
            return Err(DictError::EmptyPayload);
        }
        self.transport
            .receive(len, true)
            .ok_or(DictError::ReceiveFailed)
    }

    fn read_message(&mut self, version: u32) -> Option<String> {
        self.send_command(&format!("get{version}")).ok()?;
        self.transport.receive(GET_BANNER_LEN, false)?;

        let len = self.read_length().ok()??;
        debug!(len, "get length");
        if len == 0 {
            return None;
        }
        self.transport.receive_string(len)
    }

    fn send_command(&mut self, command: &str) -> DictResult<()> {
        let message = format!("{}{command}quit", self.config.password);
        if self.transport.send(Some(message.as_bytes())) {
            Ok(())
        } else {
            Err(DictError::SendFailed)
        }
    }

    /// Reads the length header, `None` for the null sentinel.
    fn read_length(&mut self) -> DictResult<Option<usize>> {
        let header: [u8; 4] = self
            .transport
            .receive(4, false)
            .and_then(|h| h.try_into().ok())
            .ok_or(DictError::ReceiveFailed)?;

        if &header == NULL_SENTINEL {
            return Ok(None);
        }
        Ok(Some(u32::from_le_bytes(header) as usize))
    }
}

impl std::fmt::Debug for SimpleKanban {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleKanban")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .finish()
    }
}
