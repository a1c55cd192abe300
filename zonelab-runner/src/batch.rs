//! Batch scans: one task per symbol on a bounded worker pool.
//!
//! Symbols are independent end-to-end, so they fan out across a private Rayon
//! pool and fan back in to a single `BatchReport`. A failure on one symbol is
//! recorded and the rest carry on. Callers may set the cancel flag to abandon
//! symbols that have not started yet.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use zonelab_core::{ConfigError, Direction, ZoneConfig};

use crate::pipeline::{run_symbol, PipelineError, ScanMode, StatusSummary, SymbolReport};
use crate::source::CandleSource;

/// Errors that stop a batch before any symbol runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no symbols to scan")]
    NoSymbols,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A symbol that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: String,
}

/// Fan-in of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-symbol reports, sorted by symbol.
    pub reports: Vec<SymbolReport>,
    /// Symbols whose source or pipeline failed.
    pub failures: Vec<SymbolFailure>,
    /// Symbols skipped because the batch was cancelled.
    pub cancelled: Vec<String>,
    /// Hash of the configuration that produced the reports.
    pub config_hash: String,
    pub mode: ScanMode,
    pub elapsed_secs: f64,
}

impl BatchReport {
    /// Status counts over every symbol.
    pub fn totals(&self) -> StatusSummary {
        let mut total = StatusSummary::default();
        for r in &self.reports {
            total.merge(&r.summary);
        }
        total
    }

    pub fn zone_count(&self) -> usize {
        self.reports.iter().map(|r| r.zones.len()).sum()
    }
}

/// Progress update after each finished symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub symbol: String,
    pub completed: usize,
    pub total: usize,
    pub ok: bool,
}

enum Outcome {
    Done(SymbolReport),
    Failed(PipelineError),
    Skipped,
}

/// Runs the pipeline for many symbols against one source and configuration.
pub struct BatchRunner {
    config: ZoneConfig,
    mode: ScanMode,
    jobs: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    /// Validates `config` up front so no worker starts on a bad configuration.
    pub fn new(config: ZoneConfig, mode: ScanMode) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            config,
            mode,
            jobs: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Worker count. `1` runs sequentially on the calling thread; `0` is treated as `1`.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Share an external cancel flag (e.g. one set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that callers can set to abandon pending symbols.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// Same settings and cancel flag, scanning for `direction` instead.
    pub fn for_direction(&self, direction: Direction) -> Result<Self, BatchError> {
        Ok(
            Self::new(self.config.clone().with_direction(direction), self.mode)?
                .jobs(self.jobs)
                .with_cancel_flag(self.cancel_flag()),
        )
    }

    pub fn run(
        &self,
        source: &dyn CandleSource,
        symbols: &[String],
    ) -> Result<BatchReport, BatchError> {
        self.run_with_progress(source, symbols, None)
    }

    pub fn run_with_progress(
        &self,
        source: &dyn CandleSource,
        symbols: &[String],
        progress_cb: Option<&(dyn Fn(&BatchProgress) + Sync)>,
    ) -> Result<BatchReport, BatchError> {
        if symbols.is_empty() {
            return Err(BatchError::NoSymbols);
        }

        let start = Instant::now();
        let total = symbols.len();
        let completed = AtomicUsize::new(0);
        info!(
            symbols = total,
            jobs = self.jobs,
            source = source.name(),
            "starting batch"
        );

        let process = |symbol: &String| -> (String, Outcome) {
            if self.cancel.load(Ordering::Relaxed) {
                return (symbol.clone(), Outcome::Skipped);
            }
            let outcome = match run_symbol(source, symbol, self.mode, &self.config) {
                Ok(report) => Outcome::Done(report),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "symbol failed");
                    Outcome::Failed(e)
                }
            };
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(cb) = progress_cb {
                cb(&BatchProgress {
                    symbol: symbol.clone(),
                    completed: done,
                    total,
                    ok: matches!(outcome, Outcome::Done(_)),
                });
            }
            (symbol.clone(), outcome)
        };

        let results: Vec<(String, Outcome)> = if self.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()?;
            pool.install(|| symbols.par_iter().map(process).collect())
        } else {
            symbols.iter().map(process).collect()
        };

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = Vec::new();
        for (symbol, outcome) in results {
            match outcome {
                Outcome::Done(report) => reports.push(report),
                Outcome::Failed(e) => failures.push(SymbolFailure {
                    symbol,
                    reason: e.to_string(),
                }),
                Outcome::Skipped => cancelled.push(symbol),
            }
        }
        reports.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        cancelled.sort();

        let report = BatchReport {
            reports,
            failures,
            cancelled,
            config_hash: self.config.config_hash(),
            mode: self.mode,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            symbols = report.reports.len(),
            failures = report.failures.len(),
            cancelled = report.cancelled.len(),
            zones = report.zone_count(),
            elapsed_secs = report.elapsed_secs,
            "batch complete"
        );
        Ok(report)
    }
}
