//! Simulation engine contract.
//!
//! The engine is an external service.  This module only fixes the shapes
//! exchanged with it and the [`SimulationEngine`] seam the run orchestrator
//! drives:
//!
//! ```text
//! RunRequest ──submit──► RunResponse { run_id, summary, timeseries_url }
//!                                                      │
//!                        CSV text ◄──fetch_timeseries──┘
//! ```

pub mod error;
pub mod http;

pub use error::EngineError;
pub use http::HttpEngine;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::summary::SummaryRecord;

// ── Wire types ────────────────────────────────────────────────────────────────

/// Flattened payload for one submission.
///
/// Built fresh for every attempt by
/// [`RunConfig::build_request`](crate::config::RunConfig::build_request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Workload trace, one request per line.
    pub trace_content: String,

    /// RNG seed; omitted from the payload when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Bare global keys and `"device <index> <field>"` keys.
    pub config_options: BTreeMap<String, String>,
}

/// Successful reply to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Opaque run identifier chosen by the engine.
    pub run_id: String,

    /// Inline summary record.
    pub summary: SummaryRecord,

    /// Where the raw measurement sequence can be fetched, usually relative to
    /// the engine base URL.
    pub timeseries_url: String,

    /// Output directory on the engine host.
    #[serde(default)]
    pub run_dir: Option<String>,

    #[serde(default)]
    pub summary_url: Option<String>,

    #[serde(default)]
    pub events_url: Option<String>,
}

// ── SimulationEngine ──────────────────────────────────────────────────────────

/// The two round-trips a run needs from the engine.
///
/// Implementations own transport concerns (timeouts, TLS, base URLs); the
/// orchestrator only distinguishes success from failure.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    /// Submits a run and waits for the engine to finish it.
    async fn submit(&self, request: &RunRequest) -> Result<RunResponse, EngineError>;

    /// Dereferences a `timeseries_url` and returns the raw tabular text.
    async fn fetch_timeseries(&self, timeseries_url: &str) -> Result<String, EngineError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
