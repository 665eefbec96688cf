//! Lifecycle of a single simulation run.
//!
//! [`RunOrchestrator`] drives one run at a time through the engine's two
//! round-trips and publishes the results to the [`ResultStore`]:
//!
//! ```text
//!          run()                engine accepted          summary stored
//! Idle ──────────► Submitting ─────────────────► AwaitingSummary ──────────► AwaitingSeries
//!  ▲ Ready/Failed      │                              │                           │
//!  └── run() again     └──────────── Failed(reason) ◄─┴───────────────────────────┤
//!                                                                  series derived │
//!                                                                       Ready ◄───┘
//! ```
//!
//! # Single flight
//! The check-and-set from a resting state (`Idle`, `Ready`, `Failed`) to
//! `Submitting` happens inside one `watch` channel update, so a second
//! submission while a run is in flight is refused with
//! [`RunError::AlreadyInFlight`] and leaves the in-flight run untouched.
//!
//! # Failures
//! Any error moves the run to `Failed(reason)` where `reason` is the error's
//! `Display` text.  Nothing is retried; the caller resubmits.  A failure never
//! clears results already in the store.

pub mod error;

pub use error::RunError;

use std::fmt;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::engine::{RunRequest, RunResponse, SimulationEngine};
use crate::series::{decode_records, derive};
use crate::store::ResultStore;

// ── RunState ──────────────────────────────────────────────────────────────────

/// State of the orchestrator.  Each variant carries only what is known at
/// that point of the run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunState {
    /// No run has been submitted yet.
    #[default]
    Idle,

    /// The request is on its way to the engine.
    Submitting,

    /// The engine accepted the run; its inline summary is being stored.
    AwaitingSummary {
        run_id: String,
        timeseries_url: String,
    },

    /// The summary is published; the raw series is being fetched and decoded.
    AwaitingSeries {
        run_id: String,
        timeseries_url: String,
    },

    /// Summary and series are published.
    Ready { run_id: String, samples: usize },

    /// The run stopped; `reason` is shown to the user.
    Failed { reason: String },
}

/// Data-free discriminant of [`RunState`], for logging and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Submitting,
    AwaitingSummary,
    AwaitingSeries,
    Ready,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Idle => "idle",
            RunStage::Submitting => "submitting",
            RunStage::AwaitingSummary => "awaiting summary",
            RunStage::AwaitingSeries => "awaiting series",
            RunStage::Ready => "ready",
            RunStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl RunState {
    pub fn stage(&self) -> RunStage {
        match self {
            RunState::Idle => RunStage::Idle,
            RunState::Submitting => RunStage::Submitting,
            RunState::AwaitingSummary { .. } => RunStage::AwaitingSummary,
            RunState::AwaitingSeries { .. } => RunStage::AwaitingSeries,
            RunState::Ready { .. } => RunStage::Ready,
            RunState::Failed { .. } => RunStage::Failed,
        }
    }

    /// `true` between submission and `Ready`/`Failed`.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RunState::Submitting | RunState::AwaitingSummary { .. } | RunState::AwaitingSeries { .. }
        )
    }

    /// Id of the run this state refers to, once the engine has assigned one.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            RunState::AwaitingSummary { run_id, .. }
            | RunState::AwaitingSeries { run_id, .. }
            | RunState::Ready { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Failure reason, if the last run failed.
    pub fn failure(&self) -> Option<&str> {
        match self {
            RunState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

// ── In-flight guard ───────────────────────────────────────────────────────────

/// Held for the duration of one run.  If the run future is dropped before it
/// reaches `Ready` or `Failed`, the guard fails the run so the single-flight
/// slot is released.
struct InFlight<'a> {
    state: &'a watch::Sender<RunState>,
    store: &'a ResultStore,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let reason = "run abandoned before completion";
        warn!(reason, "run future dropped while in flight");
        self.state.send_replace(RunState::Failed {
            reason: reason.to_string(),
        });
        self.store.record_failure(reason);
    }
}

// ── RunOrchestrator ───────────────────────────────────────────────────────────

/// Owns the run state machine and is the only writer of the result store.
///
/// Share it behind an `Arc` when several tasks may trigger runs; the
/// single-flight guard holds across all of them.
pub struct RunOrchestrator<E> {
    engine: E,
    store: ResultStore,
    state: watch::Sender<RunState>,
}

impl<E: SimulationEngine> RunOrchestrator<E> {
    pub fn new(engine: E, store: ResultStore) -> Self {
        let (state, _rx) = watch::channel(RunState::Idle);
        Self {
            engine,
            store,
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Read handle to the results this orchestrator publishes.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs `request` to completion and returns the engine's run id.
    ///
    /// # Errors
    /// * [`RunError::AlreadyInFlight`] if another run has not finished yet;
    ///   nothing changes.
    /// * any other [`RunError`] after the run has moved to `Failed`.
    pub async fn run(&self, request: RunRequest) -> Result<String, RunError> {
        let mut guard = self.begin()?;
        self.store.begin_submission();

        let outcome = self.drive(&request).await;
        if let Err(err) = &outcome {
            let reason = err.to_string();
            error!(reason = %reason, "run failed");
            self.transition(RunState::Failed {
                reason: reason.clone(),
            });
            self.store.record_failure(&reason);
        }
        guard.settled = true;
        outcome
    }

    /// Single-flight gate: moves a resting state to `Submitting` atomically.
    fn begin(&self) -> Result<InFlight<'_>, RunError> {
        let mut refused = None;
        self.state.send_if_modified(|s| {
            if s.is_in_flight() {
                refused = Some(s.stage());
                false
            } else {
                *s = RunState::Submitting;
                true
            }
        });

        if let Some(stage) = refused {
            warn!(%stage, "submission refused: a run is already in flight");
            return Err(RunError::AlreadyInFlight { stage });
        }

        info!("run submitted");
        Ok(InFlight {
            state: &self.state,
            store: &self.store,
            settled: false,
        })
    }

    async fn drive(&self, request: &RunRequest) -> Result<String, RunError> {
        let RunResponse {
            run_id,
            summary,
            timeseries_url,
            ..
        } = self.engine.submit(request).await?;

        self.transition(RunState::AwaitingSummary {
            run_id: run_id.clone(),
            timeseries_url: timeseries_url.clone(),
        });
        self.store.publish_summary(&run_id, summary);

        self.transition(RunState::AwaitingSeries {
            run_id: run_id.clone(),
            timeseries_url: timeseries_url.clone(),
        });
        let text = self.engine.fetch_timeseries(&timeseries_url).await?;
        let records = decode_records(&text)?;
        let series = derive(&records);
        let samples = series.len();
        self.store.publish_series(&run_id, series);

        self.transition(RunState::Ready {
            run_id: run_id.clone(),
            samples,
        });
        Ok(run_id)
    }

    fn transition(&self, next: RunState) {
        let from = self.state.borrow().stage();
        let to = next.stage();
        info!(
            %from,
            %to,
            run_id = next.run_id().unwrap_or("-"),
            "run state transition"
        );
        self.state.send_replace(next);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
