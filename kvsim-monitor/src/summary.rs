//! Summary record returned inline by the engine, and the presentation-facing
//! views derived from it (KPI list, per-device breakdown rows).

use serde::{Deserialize, Serialize};

/// Shown in place of a metric the engine did not report.
pub const PLACEHOLDER: &str = "–";

/// Aggregate metrics for one simulation run.
///
/// Every field is optional: engines built with fewer features simply omit
/// metrics they do not track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryRecord {
    pub throughput_tokens_per_sec: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub p50_ttft_ms: Option<f64>,
    pub p95_ttft_ms: Option<f64>,
    pub completion_rate: Option<f64>,
    pub reject_rate: Option<f64>,
    pub evictions: Option<f64>,
    pub memory_pressure_policy: Option<String>,
    pub handoffs_total: Option<f64>,
    pub cross_gpu_decodes: Option<f64>,
    pub retry_attempts: Option<f64>,
    pub retry_successes: Option<f64>,
    pub max_global_queue_depth: Option<f64>,
    pub per_gpu: Option<Vec<DeviceBreakdown>>,
}

/// Per-device totals reported in [`SummaryRecord::per_gpu`].
///
/// Optional like the rest of the summary: a missing or `null` entry field is
/// rendered as [`PLACEHOLDER`] instead of failing the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceBreakdown {
    pub gpu_index: Option<u32>,
    pub requests_finished: Option<f64>,
    pub tokens_generated: Option<f64>,
    pub peak_vram_bytes: Option<f64>,
}

/// One label/value card of the KPI strip.
#[derive(Debug, Clone, PartialEq)]
pub struct Kpi {
    pub label: &'static str,
    pub value: String,
}

/// One row of the per-device breakdown table.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRow {
    pub device: String,
    pub requests: String,
    pub tokens: String,
    /// Peak usage rendered in megabytes, e.g. `"12.3 MB"`.
    pub peak_vram: String,
}

fn number(v: Option<f64>) -> String {
    v.map(|n| n.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

impl SummaryRecord {
    /// KPI list in display order, with [`PLACEHOLDER`] for absent metrics.
    pub fn kpis(&self) -> Vec<Kpi> {
        let retry = match self.retry_attempts {
            Some(attempts) if attempts > 0.0 => format!(
                "{}/{}",
                self.retry_successes.unwrap_or(0.0),
                attempts
            ),
            _ => PLACEHOLDER.to_string(),
        };

        let kpi = |label, value| Kpi { label, value };
        vec![
            kpi("Throughput (tok/s)", number(self.throughput_tokens_per_sec)),
            kpi("p50 latency (ms)", number(self.p50_latency_ms)),
            kpi("p95 latency (ms)", number(self.p95_latency_ms)),
            kpi("p99 latency (ms)", number(self.p99_latency_ms)),
            kpi("p50 TTFT (ms)", number(self.p50_ttft_ms)),
            kpi("p95 TTFT (ms)", number(self.p95_ttft_ms)),
            kpi("Completion rate", number(self.completion_rate)),
            kpi("Reject rate", number(self.reject_rate)),
            kpi("Evictions", number(self.evictions)),
            kpi(
                "Policy",
                self.memory_pressure_policy
                    .clone()
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
            ),
            kpi("Handoffs", number(self.handoffs_total)),
            kpi("Cross-GPU decodes", number(self.cross_gpu_decodes)),
            kpi("Retry success", retry),
            kpi("Max global queue", number(self.max_global_queue_depth)),
        ]
    }

    /// Breakdown table rows, or `None` when the run had fewer than two
    /// devices (a single-row table adds nothing to the KPI strip).
    pub fn breakdown_rows(&self) -> Option<Vec<BreakdownRow>> {
        let per_gpu = self.per_gpu.as_ref().filter(|v| v.len() > 1)?;
        Some(
            per_gpu
                .iter()
                .enumerate()
                .map(|(position, d)| BreakdownRow {
                    // entries arrive in device order; fall back to position
                    device: format!("GPU {}", d.gpu_index.map_or(position, |i| i as usize)),
                    requests: number(d.requests_finished),
                    tokens: number(d.tokens_generated),
                    peak_vram: d
                        .peak_vram_bytes
                        .map(|b| format!("{:.1} MB", b / 1e6))
                        .unwrap_or_else(|| PLACEHOLDER.to_string()),
                })
                .collect(),
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
