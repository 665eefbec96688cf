/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error type returned by [`RunOrchestrator::run`](super::RunOrchestrator::run).
//!
//! Two kinds of outcome are distinguished:
//!
//! * [`RunError::AlreadyInFlight`]: the submission was refused and nothing
//!   changed; the in-flight run continues untouched.
//! * every other variant: the run reached `Failed`; the `Display` output is
//!   the failure reason recorded in the state and the result store.

use thiserror::Error;

use crate::engine::EngineError;
use crate::series::DecodeError;

use super::RunStage;

#[derive(Debug, Error)]
pub enum RunError {
    /// A run is already between submission and completion.
    #[error("a run is already in flight ({stage})")]
    AlreadyInFlight { stage: RunStage },

    /// The engine refused or could not be reached.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The timeseries text could not be decoded into records.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl RunError {
    /// `true` if the submission was refused without touching any state.
    pub fn is_rejected(&self) -> bool {
        matches!(self, RunError::AlreadyInFlight { .. })
    }
}
