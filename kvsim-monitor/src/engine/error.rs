/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Failures talking to the simulation engine.
//!
//! The `Display` output of every variant is the message shown to the user as
//! the run's failure reason, so rejected requests display the engine's own
//! body text verbatim.

use thiserror::Error;

/// Error returned by a [`SimulationEngine`](super::SimulationEngine) call.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine answered with a non-success status.
    ///
    /// `message` is the response body, or a generic status line when the
    /// body was empty.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (connect failure, timeout, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine answered with success but the body was not the expected
    /// shape.
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Builds a [`EngineError::Status`] for a rejected submission, falling
    /// back to `"Backend error <status>"` when the body is blank.
    pub fn rejected(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("Backend error {status}")
        } else {
            body.to_string()
        };
        EngineError::Status { status, message }
    }

    /// Builds a [`EngineError::Status`] for a failed timeseries fetch.
    pub fn timeseries_unavailable(status: u16) -> Self {
        EngineError::Status {
            status,
            message: format!("Failed to fetch timeseries: {status}"),
        }
    }

    /// HTTP status code, if the engine answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::InvalidResponse(err.to_string())
        } else {
            EngineError::Transport(err.to_string())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
