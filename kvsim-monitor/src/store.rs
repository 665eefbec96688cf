//! Session-scoped holder for the latest run's results.
//!
//! The store is a single slot, not a history.  Every update swaps in a
//! complete [`ResultSnapshot`] under the channel lock, so a reader always
//! sees one coherent snapshot and never a half-applied write.  Only the
//! [`RunOrchestrator`](crate::run::RunOrchestrator) writes to it.
//!
//! Results arrive in two stages.  The summary of a new run replaces the old
//! one as soon as the engine answers; the series follows once it has been
//! fetched and derived.  Between the two, the snapshot pairs the new summary
//! with the previous run's series, which [`ResultSnapshot::series_is_stale`]
//! reports.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::series::DerivedSeries;
use crate::summary::SummaryRecord;

/// Immutable view of the store at one instant.
///
/// Cloning is cheap: the summary and series are shared.
#[derive(Debug, Clone, Default)]
pub struct ResultSnapshot {
    /// Run whose series is published, i.e. the latest run to reach `Ready`.
    pub run_id: Option<String>,

    /// Run whose summary is published.
    pub summary_run_id: Option<String>,

    pub summary: Option<Arc<SummaryRecord>>,

    pub series: Option<Arc<DerivedSeries>>,

    /// Reason the most recent submission failed, cleared by the next one.
    pub failure: Option<String>,

    /// `true` while a submission is in flight.
    pub submitting: bool,
}

impl ResultSnapshot {
    /// `true` when the published series belongs to an older run than the
    /// published summary.
    pub fn series_is_stale(&self) -> bool {
        self.series.is_some() && self.summary_run_id != self.run_id
    }

    /// `true` once any run has produced a summary.
    pub fn has_results(&self) -> bool {
        self.summary.is_some()
    }
}

/// Shared handle to the single result slot.
#[derive(Debug, Clone)]
pub struct ResultStore {
    tx: Arc<watch::Sender<ResultSnapshot>>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ResultSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ResultSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every update.
    pub fn subscribe(&self) -> watch::Receiver<ResultSnapshot> {
        self.tx.subscribe()
    }

    // ── Writers (orchestrator only) ───────────────────────────────────────────

    pub(crate) fn begin_submission(&self) {
        self.tx.send_modify(|s| {
            s.submitting = true;
            s.failure = None;
        });
    }

    pub(crate) fn publish_summary(&self, run_id: &str, summary: SummaryRecord) {
        debug!(run_id, "publishing summary");
        self.tx.send_modify(|s| {
            s.summary_run_id = Some(run_id.to_string());
            s.summary = Some(Arc::new(summary));
        });
    }

    pub(crate) fn publish_series(&self, run_id: &str, series: DerivedSeries) {
        debug!(run_id, samples = series.len(), "publishing series");
        self.tx.send_modify(|s| {
            s.run_id = Some(run_id.to_string());
            s.series = Some(Arc::new(series));
            s.submitting = false;
        });
    }

    pub(crate) fn record_failure(&self, reason: &str) {
        debug!(reason, "recording failure");
        self.tx.send_modify(|s| {
            s.failure = Some(reason.to_string());
            s.submitting = false;
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
