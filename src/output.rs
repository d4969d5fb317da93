use std::io::{self, Write};

use serde::Serialize;

use crate::download::{ProgressEvent, ProgressSink};
use crate::router::Response;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_response(response: &Response) -> io::Result<()> {
        Self::print_json(response)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Progress lines on stderr so stdout stays valid JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let status = match event.status {
            crate::download::DownloadStatus::Downloading => "downloading",
            crate::download::DownloadStatus::Processing => "processing",
            crate::download::DownloadStatus::Zipping => "zipping",
        };
        eprintln!(
            "[{}/{}] {status}: {}",
            event.current, event.total, event.current_item
        );
    }
}
