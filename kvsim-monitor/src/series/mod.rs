//! Raw measurement records and the series derived from them for charting.
//!
//! The engine samples its state at irregular intervals and writes one row per
//! sample.  [`derive`] turns that sequence into parallel arrays, all aligned
//! by index to the input:
//!
//! | Output | Source |
//! |---|---|
//! | `time_ms` | `time_ms` |
//! | `vram_used` | `vram_used` |
//! | `queue_depth` | `queue_depth` |
//! | `global_queue_depth` | `global_queue_depth`, absent → 0 |
//! | `tokens_per_sec` | `tokens_generated_delta / Δt` |
//! | `device_vram[i]` | `vram_gpu<i>`, probed from 0 until the first gap |
//!
//! Malformed input is never rejected.  Missing required values project to
//! `NaN` and a non-positive interval yields zero throughput, so a chart can
//! still be drawn for a run that has already finished.

pub mod chart;
pub mod decode;

pub use chart::{Chart, Trace};
pub use decode::{decode_records, DecodeError};

use std::collections::BTreeMap;

// ── Column names ──────────────────────────────────────────────────────────────

pub const COL_TIME_MS: &str = "time_ms";
pub const COL_VRAM_USED: &str = "vram_used";
pub const COL_QUEUE_DEPTH: &str = "queue_depth";
pub const COL_GLOBAL_QUEUE_DEPTH: &str = "global_queue_depth";
pub const COL_TOKENS_DELTA: &str = "tokens_generated_delta";

/// Prefix of the per-device usage columns: `vram_gpu0`, `vram_gpu1`, …
pub const DEVICE_VRAM_PREFIX: &str = "vram_gpu";

/// Column name holding device `index`'s usage.
pub fn device_vram_column(index: usize) -> String {
    format!("{DEVICE_VRAM_PREFIX}{index}")
}

// ── MeasurementRecord ─────────────────────────────────────────────────────────

/// One row of the raw measurement sequence.
///
/// Columns are kept by name so device columns can be discovered by probing.
/// A column that exists but has no numeric value in this row is stored as
/// `None`; a column that does not exist at all is absent from the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementRecord {
    columns: BTreeMap<String, Option<f64>>,
}

impl MeasurementRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, column: &str, value: f64) -> Self {
        self.insert(column, Some(value));
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Option<f64>) {
        self.columns.insert(column.into(), value);
    }

    /// Returns `true` if the record carries `column`, even without a value.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Numeric value of `column`, if present and numeric.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns.get(column).copied().flatten()
    }

    /// Value of a required column; `NaN` when missing.
    fn required(&self, column: &str) -> f64 {
        self.get(column).unwrap_or(f64::NAN)
    }

    pub fn time_ms(&self) -> f64 {
        self.required(COL_TIME_MS)
    }
}

// ── DerivedSeries ─────────────────────────────────────────────────────────────

/// Usage series for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSeries {
    pub index: usize,
    /// Display name, e.g. `"GPU 0"`.
    pub name: String,
    pub values: Vec<f64>,
}

/// Chart-ready arrays derived from a measurement sequence.
///
/// Every vector has the same length as the input sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSeries {
    pub time_ms: Vec<f64>,
    pub vram_used: Vec<f64>,
    pub queue_depth: Vec<f64>,
    pub global_queue_depth: Vec<f64>,
    pub tokens_per_sec: Vec<f64>,
    pub device_vram: Vec<DeviceSeries>,
}

impl DerivedSeries {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.time_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_ms.is_empty()
    }

    /// Writes the series as CSV, one row per sample, device columns last.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("time_ms,vram_used,queue_depth,global_queue_depth,tokens_per_sec");
        for d in &self.device_vram {
            csv.push(',');
            csv.push_str(&device_vram_column(d.index));
        }
        csv.push('\n');

        for i in 0..self.len() {
            csv.push_str(&format!(
                "{},{},{},{},{}",
                self.time_ms[i],
                self.vram_used[i],
                self.queue_depth[i],
                self.global_queue_depth[i],
                self.tokens_per_sec[i]
            ));
            for d in &self.device_vram {
                csv.push_str(&format!(",{}", d.values[i]));
            }
            csv.push('\n');
        }
        csv
    }
}

// ── Derivation ────────────────────────────────────────────────────────────────

/// Instantaneous throughput in tokens/s for each sample.
///
/// `tps[0] = 0`; for `i > 0`, `tps[i] = delta[i] / ((t[i] - t[i-1]) / 1000)`,
/// or `0` when the interval is not strictly positive (duplicate or
/// out-of-order timestamps).
pub fn throughput(records: &[MeasurementRecord]) -> Vec<f64> {
    let mut out = Vec::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        if i == 0 {
            out.push(0.0);
            continue;
        }
        let dt_s = (r.time_ms() - records[i - 1].time_ms()) / 1000.0;
        // NaN compares false, so a missing timestamp also lands here
        if dt_s > 0.0 {
            out.push(r.required(COL_TOKENS_DELTA) / dt_s);
        } else {
            out.push(0.0);
        }
    }
    out
}

/// Discovers per-device usage series.
///
/// Probes `vram_gpu0`, `vram_gpu1`, … against the first record and stops at
/// the first index it lacks, even if higher indices exist.  Rows without a
/// value for a discovered column contribute `0` for that sample only.
pub fn device_series(records: &[MeasurementRecord]) -> Vec<DeviceSeries> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let mut series = Vec::new();
    for index in 0.. {
        let column = device_vram_column(index);
        if !first.has_column(&column) {
            break;
        }
        series.push(DeviceSeries {
            index,
            name: format!("GPU {index}"),
            values: records
                .iter()
                .map(|r| r.get(&column).unwrap_or(0.0))
                .collect(),
        });
    }
    series
}

/// Derives every chart series from `records`.
pub fn derive(records: &[MeasurementRecord]) -> DerivedSeries {
    let project = |column: &str| -> Vec<f64> { records.iter().map(|r| r.required(column)).collect() };

    DerivedSeries {
        time_ms: project(COL_TIME_MS),
        vram_used: project(COL_VRAM_USED),
        queue_depth: project(COL_QUEUE_DEPTH),
        global_queue_depth: records
            .iter()
            .map(|r| r.get(COL_GLOBAL_QUEUE_DEPTH).unwrap_or(0.0))
            .collect(),
        tokens_per_sec: throughput(records),
        device_vram: device_series(records),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
