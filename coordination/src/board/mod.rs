//! Bulletin board: durable, file-backed feed of cross-task findings
//!
//! Tasks running in other processes append envelopes to `*.jsonl` files in a
//! shared directory. The ralph loop reads them back as prompt context.
//! Reading is lenient: a corrupt line costs that line only.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{
    Envelope, EnvelopeReceiver, BOARD_CONTEXT, BOARD_DISCOVERY, BOARD_INTENT, BOARD_WARNING,
};

/// Extension of files the board reads.
pub const BOARD_FILE_EXTENSION: &str = "jsonl";

/// Errors from board operations
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Failed to read board directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write board file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read every board file in `dir`, keeping all warnings and the most recent
/// other entries up to `max_messages` in total.
///
/// Warnings come first in the result. If warnings alone exceed
/// `max_messages`, only warnings are returned. A missing directory is an
/// empty board.
pub fn read_board(dir: &Path, max_messages: usize) -> Result<Vec<Envelope>, BoardError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(BoardError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == BOARD_FILE_EXTENSION)
        })
        .collect();
    files.sort();

    let mut warnings = Vec::new();
    let mut others = Vec::new();
    for path in &files {
        for envelope in read_board_file(path) {
            if envelope.msg_type == BOARD_WARNING {
                warnings.push(envelope);
            } else {
                others.push(envelope);
            }
        }
    }

    let remaining = max_messages.saturating_sub(warnings.len());
    if others.len() > remaining {
        others.drain(..others.len() - remaining);
    }

    warnings.extend(others);
    Ok(warnings)
}

fn read_board_file(path: &Path) -> Vec<Envelope> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), "Skipping unreadable board file: {}", e);
            return Vec::new();
        }
    };

    // Raw byte lines: one undecodable line must not hide the ones after it
    let mut envelopes = Vec::new();
    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, "Stopping at board read error: {}", e);
                break;
            }
        };
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice::<Envelope>(&line) {
            Ok(envelope) => envelopes.push(envelope),
            Err(e) => {
                debug!(path = %path.display(), line = index + 1, "Skipping malformed board line: {}", e)
            }
        }
    }
    envelopes
}

/// Display label for a board message type.
fn label_for(msg_type: &str) -> &'static str {
    match msg_type {
        BOARD_DISCOVERY => "DISCOVERY",
        BOARD_WARNING => "WARNING",
        BOARD_INTENT => "INTENT",
        BOARD_CONTEXT => "CONTEXT",
        _ => "INFO",
    }
}

/// Render board entries as a markdown section for prompt injection.
pub fn format_board_context(entries: &[Envelope]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Peer Task Findings (from bulletin board)\n\n");
    for entry in entries {
        out.push_str(&format!(
            "- **[{}]** ({}): {}\n",
            label_for(&entry.msg_type),
            entry.sender,
            entry.text().unwrap_or_default()
        ));
    }
    out
}

/// Append-only JSONL writer for one board file.
#[derive(Debug, Clone)]
pub struct BoardWriter {
    path: PathBuf,
}

impl BoardWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one envelope as a single line.
    pub fn append(&self, envelope: &Envelope) -> Result<(), BoardError> {
        let mut line = serde_json::to_string(envelope)?;
        line.push('\n');

        let write_err = |source: std::io::Error| BoardError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)
    }
}

/// Drain a bus subscription into a board file until the subscription closes.
///
/// Returns the number of envelopes written.
pub fn spawn_board_recorder(
    mut receiver: EnvelopeReceiver,
    writer: BoardWriter,
) -> tokio::task::JoinHandle<usize> {
    tokio::spawn(async move {
        let mut written = 0;
        while let Some(envelope) = receiver.recv().await {
            match writer.append(&envelope) {
                Ok(()) => written += 1,
                Err(e) => warn!(seq = envelope.seq, "Failed to record board entry: {}", e),
            }
        }
        debug!(path = %writer.path().display(), written, "Board recorder stopped");
        written
    })
}
