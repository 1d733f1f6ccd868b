//! Durable progress tracking for resumable runs.
//!
//! The output file's complete-row count is the authoritative resume
//! position: rows are only appended through a verified flush, and a
//! truncated trailing line fails the CSV field-count check and is not
//! counted. A sidecar JSON file next to the output carries audit metadata
//! (provider, chunk size, commit time) and is cross-checked on load.

use std::ffi::OsString;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

/// Persisted marker of the last fully-committed row.
///
/// Invariant: every row with index <= `last_completed_index` is already
/// written to the output; resuming starts at `last_completed_index + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_completed_index: u64,
    pub chunk_size: usize,
    pub provider_id: String,
    pub committed_at: DateTime<Utc>,
}

/// Result of scanning the existing output for complete rows.
struct OutputScan {
    /// Complete data rows (header excluded).
    rows: u64,
    /// Byte offset just past the last complete record.
    clean_end: u64,
}

/// Checkpoint persistence keyed by the output file's identity.
pub struct CheckpointStore {
    output_path: PathBuf,
    sidecar_path: PathBuf,
}

impl CheckpointStore {
    pub fn for_output(output: &Path) -> Self {
        Self {
            output_path: output.to_path_buf(),
            sidecar_path: append_suffix(output, ".checkpoint"),
        }
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    /// Infer how far a previous run got, or `None` when there is no prior
    /// output to resume from.
    pub fn load(&self) -> Result<Option<Checkpoint>, EngineError> {
        let Some(scan) = self.scan_output()? else {
            return Ok(None);
        };
        if scan.rows == 0 {
            return Ok(None);
        }
        let last_completed_index = scan.rows - 1;

        match self.read_sidecar() {
            Some(cp) if cp.last_completed_index == last_completed_index => Ok(Some(cp)),
            Some(cp) => {
                // The rows on disk are durable; the sidecar is only audit
                // metadata, so the output wins.
                warn!(
                    "checkpoint {} records row {} but output {} holds {} complete row(s); trusting the output",
                    self.sidecar_path.display(),
                    cp.last_completed_index,
                    self.output_path.display(),
                    scan.rows
                );
                Ok(Some(Checkpoint {
                    last_completed_index,
                    ..cp
                }))
            }
            None => Ok(Some(Checkpoint {
                last_completed_index,
                chunk_size: 0,
                provider_id: String::new(),
                committed_at: Utc::now(),
            })),
        }
    }

    /// Durably persist progress. Written to a temp file and renamed so a
    /// crash never leaves a half-written sidecar.
    pub fn commit(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        let body = serde_json::to_vec_pretty(checkpoint).expect("checkpoint serializes");
        let tmp = append_suffix(&self.sidecar_path, ".tmp");

        let write = fs::write(&tmp, body).and_then(|_| fs::rename(&tmp, &self.sidecar_path));
        write.map_err(|source| EngineError::CheckpointWrite {
            path: self.sidecar_path.clone(),
            source,
        })
    }

    /// Make the existing output safe to append to: drop any record
    /// truncated mid-write, and terminate an unterminated final line.
    /// Must run before the output is reopened in append mode.
    pub fn repair_output_tail(&self) -> Result<(), EngineError> {
        let Some(scan) = self.scan_output()? else {
            return Ok(());
        };

        let len = fs::metadata(&self.output_path)
            .map_err(|source| self.io_write_err(source))?
            .len();
        if scan.clean_end < len {
            warn!(
                "dropping {} byte(s) of partial trailing data from {}",
                len - scan.clean_end,
                self.output_path.display()
            );
            let file = fs::OpenOptions::new()
                .write(true)
                .open(&self.output_path)
                .map_err(|source| self.io_write_err(source))?;
            file.set_len(scan.clean_end)
                .map_err(|source| self.io_write_err(source))?;
        }

        self.ensure_trailing_newline()
    }

    /// Count complete data rows and where they end. Scanning stops at the
    /// first malformed record, so a line truncated mid-write is excluded
    /// rather than resumed past. `None` when the output does not exist.
    fn scan_output(&self) -> Result<Option<OutputScan>, EngineError> {
        let mut reader = match csv::Reader::from_path(&self.output_path) {
            Ok(reader) => reader,
            Err(err) => {
                if is_not_found(&err) {
                    return Ok(None);
                }
                return Err(self.inspect_err(err));
            }
        };

        // Force the header read so `position` starts at the first data row.
        reader.headers().map_err(|err| self.inspect_err(err))?;

        let mut record = StringRecord::new();
        let mut scan = OutputScan {
            rows: 0,
            clean_end: reader.position().byte(),
        };
        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {
                    scan.rows += 1;
                    scan.clean_end = reader.position().byte();
                }
                Ok(false) => break,
                Err(err) => {
                    warn!(
                        "output {} has a malformed trailing record ({}); resuming before it",
                        self.output_path.display(),
                        err
                    );
                    break;
                }
            }
        }
        Ok(Some(scan))
    }

    /// A complete final record with no terminator parses fine but must not
    /// have the next row appended onto the same line.
    fn ensure_trailing_newline(&self) -> Result<(), EngineError> {
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.output_path)
            .map_err(|source| self.io_write_err(source))?;
        let len = file
            .metadata()
            .map_err(|source| self.io_write_err(source))?
            .len();
        if len == 0 {
            return Ok(());
        }

        file.seek(SeekFrom::End(-1))
            .map_err(|source| self.io_write_err(source))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .map_err(|source| self.io_write_err(source))?;
        if last[0] != b'\n' {
            file.write_all(b"\n")
                .map_err(|source| self.io_write_err(source))?;
        }
        Ok(())
    }

    fn read_sidecar(&self) -> Option<Checkpoint> {
        let body = match fs::read_to_string(&self.sidecar_path) {
            Ok(body) => body,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "cannot read checkpoint {}: {}",
                        self.sidecar_path.display(),
                        err
                    );
                }
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(cp) => Some(cp),
            Err(err) => {
                warn!(
                    "ignoring malformed checkpoint {}: {}",
                    self.sidecar_path.display(),
                    err
                );
                None
            }
        }
    }

    fn inspect_err(&self, source: csv::Error) -> EngineError {
        EngineError::OutputInspect {
            path: self.output_path.clone(),
            source,
        }
    }

    fn io_write_err(&self, source: std::io::Error) -> EngineError {
        EngineError::OutputWrite {
            path: self.output_path.clone(),
            source: source.into(),
        }
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn is_not_found(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound)
}
