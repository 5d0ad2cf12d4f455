//! Update checks and verified downloads on top of a kanban session.
//!
//! The kanban server answers `get<version>` with either `null` (the caller is
//! up to date) or a message of the form:
//!
//! ```text
//! 5
//! Release notes, possibly
//! spanning several lines
//! md5:0123456789abcdef0123456789abcdef
//! ```
//!
//! The `md5:` trailer is only present when a downloadable package exists.

use crate::cache::digest;
use crate::kanban::SimpleKanban;
use sdict_io::Progress;
use tracing::{debug, info, warn};

/// Why a download was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DownloadFailure {
    /// The kanban fetch failed.
    Network = 0,
    /// The payload digest did not match.
    Corrupt = 1,
}

/// A parsed update announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    /// Announced version.
    pub version: u32,
    /// Release notes.
    pub message: String,
    /// Expected hex digest of the package, if one is downloadable.
    pub md5: Option<String>,
}

impl UpdateNotice {
    /// Parses a kanban message.
    ///
    /// Returns `None` if the first line is not a version number.
    pub fn parse(text: &str) -> Option<Self> {
        let (head, rest) = text.split_once('\n').unwrap_or((text, text));
        let version = head.trim().parse().ok()?;

        let Some((_, md5)) = text.rsplit_once("md5:") else {
            return Some(Self {
                version,
                message: rest.to_owned(),
                md5: None,
            });
        };

        let message = rest.rsplit_once('\n').map_or(rest, |(body, _)| body);
        Some(Self {
            version,
            message: message.to_owned(),
            md5: Some(md5.trim().to_owned()),
        })
    }
}

/// Receives update events. Every method defaults to doing nothing.
pub trait UpdateHandler {
    /// A newer version was announced.
    fn on_new_version(&mut self, version: u32, message: &str, md5: Option<&str>) {
        let _ = (version, message, md5);
    }

    /// The installed version is the latest.
    fn on_latest_version(&mut self, version: u32) {
        let _ = version;
    }

    /// A download failed.
    fn on_download_failed(&mut self, cause: DownloadFailure) {
        let _ = cause;
    }

    /// A download succeeded and its digest matched.
    fn on_download_success(&mut self, data: &[u8]) {
        let _ = data;
    }
}

/// Checks for and downloads new versions, reporting through a handler.
#[derive(Debug)]
pub struct UpdateChecker<H: UpdateHandler> {
    kanban: SimpleKanban,
    handler: H,
}

impl<H: UpdateHandler> UpdateChecker<H> {
    /// Creates a checker.
    pub fn new(kanban: SimpleKanban, handler: H) -> Self {
        Self { kanban, handler }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the handler mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consumes the checker, returning the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Asks the server what is newer than `current`.
    ///
    /// An unreachable server counts as "latest". A message whose first line
    /// is not a number is ignored.
    pub fn check(&mut self, current: u32) {
        let Some(text) = self.kanban.get(current) else {
            debug!(current, "no update");
            self.handler.on_latest_version(current);
            return;
        };

        match UpdateNotice::parse(&text) {
            Some(notice) => {
                info!(current, version = notice.version, "update available");
                self.handler
                    .on_new_version(notice.version, &notice.message, notice.md5.as_deref());
            }
            None => warn!(current, "ignoring malformed update message"),
        }
    }

    /// Downloads the package and checks it against `md5_hex`.
    ///
    /// The comparison ignores ASCII case.
    pub fn download(&mut self, md5_hex: &str, progress: impl Progress + 'static) {
        self.kanban.set_progress(progress);
        let result = self.kanban.fetch();
        self.kanban.clear_progress();

        match result {
            Ok(data) => {
                let actual = hex::encode(digest(&data));
                if actual.eq_ignore_ascii_case(md5_hex.trim()) {
                    info!(bytes = data.len(), "update downloaded");
                    self.handler.on_download_success(&data);
                } else {
                    warn!(expected = md5_hex, actual = %actual, "update digest mismatch");
                    self.handler.on_download_failed(DownloadFailure::Corrupt);
                }
            }
            Err(e) => {
                warn!(error = %e, "update download failed");
                self.handler.on_download_failed(DownloadFailure::Network);
            }
        }
    }
}
