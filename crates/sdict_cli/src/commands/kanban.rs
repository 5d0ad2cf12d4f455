//! Kanban commands.

use indicatif::{ProgressBar, ProgressStyle};
use sdict_engine::{ClientConfig, DownloadFailure, SimpleKanban, UpdateChecker, UpdateHandler};
use sdict_io::Transport;
use std::path::Path;

fn open(config: &ClientConfig) -> SimpleKanban {
    SimpleKanban::new(Transport::new(config.kanban_transport()), config.kanban_config())
}

/// Runs the kanban-get command. Prints `null` if there is no message.
pub fn get(config: &ClientConfig, version: u32) {
    match open(config).get(version) {
        Some(message) => println!("{message}"),
        None => println!("null"),
    }
}

/// Prints update events as they arrive.
#[derive(Debug, Default)]
struct ConsoleHandler {
    reported: bool,
    downloaded: Option<Vec<u8>>,
    failure: Option<DownloadFailure>,
}

impl UpdateHandler for ConsoleHandler {
    fn on_new_version(&mut self, version: u32, message: &str, md5: Option<&str>) {
        self.reported = true;
        println!("New version {version} available");
        println!("{message}");
        if let Some(md5) = md5 {
            println!("md5: {md5}");
        }
    }

    fn on_latest_version(&mut self, version: u32) {
        self.reported = true;
        println!("Version {version} is the latest");
    }

    fn on_download_failed(&mut self, cause: DownloadFailure) {
        self.failure = Some(cause);
    }

    fn on_download_success(&mut self, data: &[u8]) {
        self.downloaded = Some(data.to_vec());
    }
}

/// Runs the check-update command.
pub fn check_update(config: &ClientConfig, current_version: u32) {
    let mut checker = UpdateChecker::new(open(config), ConsoleHandler::default());
    checker.check(current_version);
    if !checker.handler().reported {
        println!("No valid update information");
    }
}

/// Runs the download command.
pub fn download(config: &ClientConfig, md5: &str, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}%")?.progress_chars("=> "),
    );

    let mut checker = UpdateChecker::new(open(config), ConsoleHandler::default());
    let progress = bar.clone();
    checker.download(md5, move |pct: u32| progress.set_position(u64::from(pct)));
    bar.finish_and_clear();

    let handler = checker.into_handler();
    match (handler.downloaded, handler.failure) {
        (Some(data), _) => {
            std::fs::write(out, &data)?;
            println!("Saved {} bytes to {}", data.len(), out.display());
            Ok(())
        }
        (None, Some(DownloadFailure::Corrupt)) => Err("Downloaded file is corrupt (MD5 mismatch)".into()),
        (None, _) => Err("Download failed".into()),
    }
}
