//! Standard chart set for a run, described as plain data.
//!
//! The presentation layer draws these however it likes; it only needs the
//! shared x axis (`time_ms`) and the named traces.

use super::DerivedSeries;

/// One named line on a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace<'a> {
    pub name: String,
    pub y: &'a [f64],
}

/// A chart over the run's time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart<'a> {
    pub title: &'static str,
    pub y_title: &'static str,
    pub x: &'a [f64],
    pub traces: Vec<Trace<'a>>,
}

impl Chart<'_> {
    /// A legend is only worth drawing with more than one trace.
    pub fn show_legend(&self) -> bool {
        self.traces.len() > 1
    }
}

fn trace<'a>(name: &str, y: &'a [f64]) -> Trace<'a> {
    Trace {
        name: name.to_string(),
        y,
    }
}

impl DerivedSeries {
    /// Charts in display order.  The per-device usage chart is only included
    /// when more than one device series was discovered.
    pub fn charts(&self) -> Vec<Chart<'_>> {
        let x = self.time_ms.as_slice();
        let mut charts = vec![Chart {
            title: "VRAM over time (total)",
            y_title: "bytes",
            x,
            traces: vec![trace("Total VRAM", &self.vram_used)],
        }];

        if self.device_vram.len() > 1 {
            charts.push(Chart {
                title: "VRAM per GPU",
                y_title: "bytes",
                x,
                traces: self
                    .device_vram
                    .iter()
                    .map(|d| trace(&d.name, &d.values))
                    .collect(),
            });
        }

        charts.push(Chart {
            title: "Queue depth over time",
            y_title: "depth",
            x,
            traces: vec![
                trace("Per-GPU queues", &self.queue_depth),
                trace("Global queue", &self.global_queue_depth),
            ],
        });
        charts.push(Chart {
            title: "Tokens/sec over time",
            y_title: "tokens/sec",
            x,
            traces: vec![trace("Tokens/sec", &self.tokens_per_sec)],
        });
        charts
    }
}

#[cfg(test)]
mod tests {
    use crate::series::{derive, MeasurementRecord};

    fn records(devices: usize) -> Vec<MeasurementRecord> {
        (0..3)
            .map(|i| {
                let mut r = MeasurementRecord::new()
                    .with("time_ms", i as f64 * 20.0)
                    .with("vram_used", 1.0)
                    .with("queue_depth", 0.0)
                    .with("tokens_generated_delta", 1.0);
                for d in 0..devices {
                    r = r.with(&format!("vram_gpu{d}"), 0.5);
                }
                r
            })
            .collect()
    }

    #[test]
    fn single_device_run_has_three_charts() {
        let series = derive(&records(1));
        let titles: Vec<_> = series.charts().iter().map(|c| c.title).collect();
        assert_eq!(
            titles,
            vec![
                "VRAM over time (total)",
                "Queue depth over time",
                "Tokens/sec over time"
            ]
        );
    }

    #[test]
    fn multi_device_run_adds_per_device_chart() {
        let series = derive(&records(2));
        let charts = series.charts();
        assert_eq!(charts.len(), 4);
        assert_eq!(charts[1].title, "VRAM per GPU");
        assert_eq!(charts[1].traces.len(), 2);
        assert!(charts[1].show_legend());
        assert!(!charts[0].show_legend());
    }

    #[test]
    fn charts_share_the_time_axis() {
        let series = derive(&records(0));
        for chart in series.charts() {
            assert_eq!(chart.x, &[0.0, 20.0, 40.0][..]);
            assert!(chart.traces.iter().all(|t| t.y.len() == 3));
        }
    }
}
