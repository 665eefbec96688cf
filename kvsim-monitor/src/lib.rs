/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! kvsim-monitor – front end for the KV-cache scheduling simulator
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/         – run configuration: global fields, per-device overrides
//! ├── engine/         – SimulationEngine trait + HTTP/JSON transport
//! ├── run/            – single-flight run state machine
//! ├── series/         – timeseries decoding, derived chart series
//! ├── store.rs        – latest-run result slot
//! └── summary.rs      – summary record, KPI and per-device tables
//! ```

pub mod config;
pub mod engine;
pub mod run;
pub mod series;
pub mod store;
pub mod summary;
