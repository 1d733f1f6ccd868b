//! Batch orchestration: the chunked, resumable processing loop.
//!
//! One logical worker: each row is fully processed (extract, rate
//! acquire, provider call, merge) before the next begins, preserving a
//! strict row-index order that checkpoint correctness depends on.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use csv::StringRecord;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::extract::AddressExtractor;
use crate::models::{output_header, output_record, GeocodeResult, GeocodeStatus};
use crate::providers::Provider;

/// Lifecycle of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Running,
    Completed,
    Aborted,
}

/// Counters accumulated over a run.
///
/// On resume the counters are seeded from the statuses already present in
/// the output, so the final report covers the whole file; elapsed time
/// covers the current process only.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Rows submitted to the provider (succeeded + failed).
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Rows skipped for lack of usable address data.
    pub no_address: u64,
    started: Instant,
}

impl RunStats {
    fn new() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            no_address: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, status: GeocodeStatus) {
        match status {
            GeocodeStatus::Success => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            GeocodeStatus::Failed => {
                self.attempted += 1;
                self.failed += 1;
            }
            GeocodeStatus::NoAddress => self.no_address += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.attempted + self.no_address
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Final report of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    /// Data rows in the input file.
    pub total_rows: u64,
    /// First row index processed by this run (0 for a fresh run).
    pub resumed_from: u64,
    /// Rows processed by this run.
    pub rows_processed: u64,
    /// Last row index covered by a committed checkpoint.
    pub last_committed: Option<u64>,
}

/// Drives a whole run: input scan, resume, the row loop, chunk commits.
pub struct BatchProcessor {
    config: RunConfig,
    provider: Provider,
    state: RunState,
}

impl BatchProcessor {
    pub fn new(config: RunConfig, provider: Provider) -> Self {
        Self {
            config,
            provider,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process the configured input to completion.
    ///
    /// Row-local conditions (no address, provider miss) never surface
    /// here; an `Err` means the run aborted on a configuration or
    /// persistence failure, with all previously committed chunks intact.
    pub async fn run(&mut self) -> Result<RunReport, EngineError> {
        let mut last_committed = None;
        match self.run_inner(&mut last_committed).await {
            Ok(report) => {
                self.state = RunState::Completed;
                Ok(report)
            }
            Err(err) => {
                self.state = RunState::Aborted;
                match last_committed {
                    Some(index) => error!(
                        "run aborted: {}; rows 0..={} are committed, rerun with --resume to continue from row {}",
                        err,
                        index,
                        index + 1
                    ),
                    None => error!("run aborted before any chunk was committed: {}", err),
                }
                Err(err)
            }
        }
    }

    async fn run_inner(
        &mut self,
        last_committed: &mut Option<u64>,
    ) -> Result<RunReport, EngineError> {
        self.state = RunState::Initializing;
        self.config.validate()?;

        let (headers, total_rows) = inspect_input(&self.config.input)?;
        let extractor = AddressExtractor::new(&self.config.columns, &headers);
        let store = CheckpointStore::for_output(&self.config.output);

        let mut stats = RunStats::new();
        let resume_from = if self.config.resume {
            store.repair_output_tail()?;
            match store.load()? {
                Some(cp) => {
                    if !cp.provider_id.is_empty() && cp.provider_id != self.provider.id() {
                        warn!(
                            "output was produced by provider '{}', resuming with '{}'",
                            cp.provider_id,
                            self.provider.id()
                        );
                    }
                    seed_stats(&mut stats, &self.config.output, headers.len())?;
                    *last_committed = Some(cp.last_completed_index);
                    info!("Resuming from row {}", cp.last_completed_index + 1);
                    cp.last_completed_index + 1
                }
                None => {
                    info!("Resume requested but no prior output found; starting fresh");
                    0
                }
            }
        } else {
            0
        };

        if resume_from > total_rows {
            warn!(
                "existing output holds {} row(s) but the input has only {}; nothing to do",
                resume_from, total_rows
            );
        }

        let mut sink = OutputSink::open(&self.config.output, &headers, resume_from > 0)?;

        info!(
            "Geocoding {} -> {} with provider '{}'",
            self.config.input.display(),
            self.config.output.display(),
            self.provider.id()
        );
        info!(
            "{} row(s), chunk size {}, starting at row {}",
            total_rows, self.config.chunk_size, resume_from
        );

        self.state = RunState::Running;
        let progress = progress_bar(total_rows);
        progress.set_position(resume_from.min(total_rows));

        let mut reader = input_reader(&self.config.input)?;
        let mut rows_since_commit = 0usize;
        let mut rows_processed = 0u64;

        for (index, record) in reader.records().enumerate() {
            let index = index as u64;
            let record = record.map_err(|source| EngineError::InputRead {
                path: self.config.input.clone(),
                source,
            })?;
            if index < resume_from {
                continue;
            }

            // An invalid query never touches the provider or its
            // rate-limit budget.
            let result = match extractor.extract(&record) {
                Some(query) => self.provider.geocode(&query).await,
                None => GeocodeResult::no_address(),
            };

            stats.record(result.status);
            sink.append(&record, &result)?;
            rows_processed += 1;
            rows_since_commit += 1;
            progress.inc(1);

            if rows_since_commit >= self.config.chunk_size {
                sink.flush_durable()?;
                store.commit(&self.checkpoint_at(index))?;
                *last_committed = Some(index);
                rows_since_commit = 0;
            }
        }

        sink.flush_durable()?;
        if rows_since_commit > 0 {
            // Final partial chunk.
            let index = resume_from + rows_processed - 1;
            store.commit(&self.checkpoint_at(index))?;
            *last_committed = Some(index);
        }
        progress.finish_with_message("Processing complete");

        let elapsed = stats.elapsed();
        let rate = rows_processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            "Geocoding complete: {} succeeded, {} failed, {} without address ({} total)",
            stats.succeeded,
            stats.failed,
            stats.no_address,
            stats.total()
        );
        info!(
            "Processed {} row(s) in {:.1}s ({:.2} rows/sec)",
            rows_processed,
            elapsed.as_secs_f64(),
            rate
        );

        Ok(RunReport {
            stats,
            total_rows,
            resumed_from: resume_from,
            rows_processed,
            last_committed: *last_committed,
        })
    }

    fn checkpoint_at(&self, index: u64) -> Checkpoint {
        Checkpoint {
            last_completed_index: index,
            chunk_size: self.config.chunk_size,
            provider_id: self.provider.id().to_string(),
            committed_at: Utc::now(),
        }
    }
}

/// Buffered CSV sink over the output file. Rows only count as committed
/// after `flush_durable` pushes them through the OS to disk.
struct OutputSink {
    writer: csv::Writer<File>,
    sync: File,
    path: PathBuf,
}

impl OutputSink {
    fn open(path: &Path, input_headers: &StringRecord, append: bool) -> Result<Self, EngineError> {
        let io_err = |source: std::io::Error| EngineError::OutputWrite {
            path: path.to_path_buf(),
            source: source.into(),
        };

        let file = if append {
            OpenOptions::new().append(true).open(path).map_err(io_err)?
        } else {
            File::create(path).map_err(io_err)?
        };
        let sync = file.try_clone().map_err(io_err)?;

        let mut writer = csv::Writer::from_writer(file);
        if !append {
            writer
                .write_record(&output_header(input_headers))
                .map_err(|source| EngineError::OutputWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        Ok(Self {
            writer,
            sync,
            path: path.to_path_buf(),
        })
    }

    fn append(&mut self, input: &StringRecord, result: &GeocodeResult) -> Result<(), EngineError> {
        self.writer
            .write_record(&output_record(input, result))
            .map_err(|source| EngineError::OutputWrite {
                path: self.path.clone(),
                source,
            })
    }

    /// Verified flush: drain the CSV buffer, then fsync, so a checkpoint
    /// never claims rows the disk has not seen.
    fn flush_durable(&mut self) -> Result<(), EngineError> {
        self.writer.flush().map_err(|source| EngineError::OutputWrite {
            path: self.path.clone(),
            source: source.into(),
        })?;
        self.sync.sync_data().map_err(|source| EngineError::OutputWrite {
            path: self.path.clone(),
            source: source.into(),
        })
    }
}

fn input_reader(path: &Path) -> Result<csv::Reader<File>, EngineError> {
    csv::Reader::from_path(path).map_err(|source| EngineError::InputRead {
        path: path.to_path_buf(),
        source,
    })
}

/// One pass over the input for the header and the row count, so progress
/// and resume bounds are known up front.
fn inspect_input(path: &Path) -> Result<(StringRecord, u64), EngineError> {
    let mut reader = input_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|source| EngineError::InputRead {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let mut total = 0u64;
    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => total += 1,
            Ok(false) => break,
            Err(source) => {
                return Err(EngineError::InputRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok((headers, total))
}

/// Seed counters from the statuses a previous run already wrote.
fn seed_stats(stats: &mut RunStats, output: &Path, input_columns: usize) -> Result<(), EngineError> {
    let mut reader = csv::Reader::from_path(output).map_err(|source| EngineError::OutputInspect {
        path: output.to_path_buf(),
        source,
    })?;
    let status_column = input_columns + 2;

    for record in reader.records() {
        // The tail was already repaired; stop defensively on anything odd.
        let Ok(record) = record else { break };
        if let Some(status) = record.get(status_column).and_then(GeocodeStatus::parse) {
            stats.record(status);
        }
    }
    Ok(())
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style.progress_chars("#>-"));
    pb
}
