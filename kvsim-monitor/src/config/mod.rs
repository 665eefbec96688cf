//! Run configuration: global fields, sparse per-device overrides, and the
//! assembly of both into the flat `config_options` map sent to the engine.
//!
//! The expected YAML structure is:
//! ```yaml
//! seed: 42
//! global:
//!   num_gpus: 2
//!   memory_pressure_policy: evict
//! devices:
//!   0:
//!     vram_bytes: 8589934592
//!   1:
//!     decode_tps: 700
//! ```
//!
//! Every value is carried as a string.  An empty string means "let the engine
//! use its own default" and is never sent.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::RunRequest;

// ── Per-device field set ──────────────────────────────────────────────────────

/// Configuration fields that may be set per device.
///
/// This enum is the only definition of the per-device set: the global
/// suppression rule ([`DeviceField::is_device_field`]) and the namespaced key
/// construction ([`device_key`]) both go through it, so they cannot diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceField {
    VramBytes,
    PrefillTps,
    DecodeTps,
    MaxConcurrent,
    DecodeSharingCap,
    DecodeEfficiency,
}

impl DeviceField {
    /// All per-device fields, in editor display order.
    pub const ALL: [DeviceField; 6] = [
        DeviceField::VramBytes,
        DeviceField::PrefillTps,
        DeviceField::DecodeTps,
        DeviceField::MaxConcurrent,
        DeviceField::DecodeSharingCap,
        DeviceField::DecodeEfficiency,
    ];

    /// Field name as it appears in the request payload.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceField::VramBytes => "vram_bytes",
            DeviceField::PrefillTps => "prefill_tps",
            DeviceField::DecodeTps => "decode_tps",
            DeviceField::MaxConcurrent => "max_concurrent",
            DeviceField::DecodeSharingCap => "decode_sharing_cap",
            DeviceField::DecodeEfficiency => "decode_efficiency",
        }
    }

    /// Returns `true` if `name` belongs to the per-device set.
    pub fn is_device_field(name: &str) -> bool {
        name.parse::<DeviceField>().is_ok()
    }
}

impl fmt::Display for DeviceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceField {
    type Err = UnknownDeviceField;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DeviceField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownDeviceField(s.to_string()))
    }
}

/// A field name outside the per-device set was used as a device override.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' cannot be overridden per device")]
pub struct UnknownDeviceField(pub String);

/// Namespaced request key for a per-device value: `"device <index> <field>"`.
pub fn device_key(index: usize, field: DeviceField) -> String {
    format!("device {index} {field}")
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Name of the global field that declares the device count.
pub const NUM_DEVICES_FIELD: &str = "num_gpus";

/// Built-in global defaults, in editor display order.
///
/// `memory_pressure_policy` is deliberately empty: its default differs between
/// engine builds, so the engine decides unless the user sets it.
const DEFAULT_GLOBAL_FIELDS: &[(&str, &str)] = &[
    ("num_gpus", "1"),
    ("vram_bytes", "4294967296"),
    ("max_concurrent", "4"),
    ("prefill_tps", "1200"),
    ("decode_tps", "600"),
    ("kv_bytes_per_token", "2048"),
    ("safe_reservation", "1"),
    ("max_queue", "64"),
    ("max_retries", "2"),
    ("scheduling", "fifo"),
    ("memory_pressure_policy", ""),
    ("eviction_policy", "lru"),
    ("decode_sharing_cap", "8"),
    ("decode_efficiency", "0.8"),
    ("handoff_bandwidth_gbps", "300"),
    ("handoff_latency_us", "10"),
    ("timeseries_dt_ms", "20"),
];

/// Returns the built-in global defaults as an owned map.
pub fn default_global_fields() -> BTreeMap<String, String> {
    DEFAULT_GLOBAL_FIELDS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── Private YAML deserialization types ────────────────────────────────────────

/// Any YAML scalar; stringified on load so `num_gpus: 2` and
/// `num_gpus: "2"` mean the same thing.  A key with no value is null and
/// loads as the empty string (engine default).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<ScalarValue> for String {
    fn from(v: ScalarValue) -> Self {
        match v {
            ScalarValue::Null => String::new(),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunConfigFile {
    #[serde(default)]
    seed: Option<i64>,
    #[serde(default)]
    global: BTreeMap<String, ScalarValue>,
    #[serde(default)]
    devices: BTreeMap<usize, BTreeMap<DeviceField, ScalarValue>>,
}

// ── RunConfig ─────────────────────────────────────────────────────────────────

/// Sparse override map for one device.
pub type DeviceOverride = BTreeMap<DeviceField, String>;

/// Two-level run configuration: global fields plus sparse per-device
/// overrides keyed by zero-based device index.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Global field name → value.  Unknown names are passed through.
    pub global: BTreeMap<String, String>,

    /// Device index → overrides.  Indices need not be contiguous and may
    /// exceed the declared device count; the engine validates them.
    pub devices: BTreeMap<usize, DeviceOverride>,

    /// Seed loaded from the configuration file, if any.
    pub seed: Option<i64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            global: default_global_fields(),
            devices: BTreeMap::new(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Creates a configuration holding only the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML run configuration from `path`, overlaying its `global`
    /// section on the built-in defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, or a `devices` entry names a field outside the per-device set.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading run configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))
    }

    /// Parses a YAML run configuration from a string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RunConfigFile = serde_yaml::from_str(content)?;

        let mut config = Self::new();
        config.seed = file.seed;

        for (name, value) in file.global {
            let value = String::from(value);
            debug!(field = %name, value = %value, "global field");
            config.global.insert(name, value);
        }

        for (index, fields) in file.devices {
            for (field, value) in fields {
                config.set_device_override(index, field, String::from(value));
            }
        }

        let devices = config.device_count();
        if let Some(max_index) = config.devices.keys().next_back() {
            if *max_index >= devices {
                warn!(
                    max_index,
                    devices, "device override index beyond num_gpus; passing through to engine"
                );
            }
        }

        info!(
            global_fields = config.global.len(),
            overridden_devices = config.devices.len(),
            devices,
            "Run configuration loaded"
        );

        Ok(config)
    }

    /// Sets a global field.  An empty value keeps the key but means
    /// "engine default".
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.global.insert(name.into(), value.into());
    }

    /// Sets one per-device override.  Empty values are stored as given and
    /// skipped at assembly time.
    pub fn set_device_override(&mut self, index: usize, field: DeviceField, value: String) {
        self.devices.entry(index).or_default().insert(field, value);
    }

    /// Declared device count, from the `num_gpus` global field.
    ///
    /// Non-numeric, absent or zero values fall back to `1`.
    pub fn device_count(&self) -> usize {
        self.global
            .get(NUM_DEVICES_FIELD)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    /// Returns `true` when per-device fields are edited per device rather
    /// than globally.
    pub fn is_multi_device(&self) -> bool {
        self.device_count() > 1
    }

    /// Global fields an editor should show: per-device fields are hidden
    /// from the global scope once there is more than one device.
    pub fn visible_global_fields(&self) -> Vec<(&str, &str)> {
        let multi = self.is_multi_device();
        self.global
            .iter()
            .filter(|(name, _)| !(multi && DeviceField::is_device_field(name)))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    /// Value the engine will use for `field` on device `index`: the override
    /// when set and non-empty, otherwise the global default.
    pub fn effective_device_value(&self, index: usize, field: DeviceField) -> Option<&str> {
        self.devices
            .get(&index)
            .and_then(|o| o.get(&field))
            .filter(|v| !v.is_empty())
            .or_else(|| self.global.get(field.as_str()))
            .map(String::as_str)
    }

    /// Overrides explicitly set for device `index`, skipping empty values.
    /// Unlike [`effective_device_value`](Self::effective_device_value) this
    /// never falls back to the global value.
    pub fn device_overrides(&self, index: usize) -> Vec<(DeviceField, &str)> {
        self.devices
            .get(&index)
            .map(|o| {
                o.iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(f, v)| (*f, v.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Flattens the configuration into the engine's `config_options` map.
    ///
    /// Rules, applied in order:
    /// 1. A global field goes out under its bare name unless its value is
    ///    empty, or there is more than one device and it is a per-device
    ///    field (regardless of value).
    /// 2. Every non-empty device override goes out as
    ///    `"device <index> <field>"`.
    ///
    /// Global-only fields are never namespaced.  Calling this twice on the
    /// same configuration yields identical maps.
    pub fn assemble(&self) -> BTreeMap<String, String> {
        let multi = self.is_multi_device();
        let mut out = BTreeMap::new();

        for (name, value) in &self.global {
            if value.is_empty() {
                continue;
            }
            if multi && DeviceField::is_device_field(name) {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }

        for (index, overrides) in &self.devices {
            for (field, value) in overrides {
                if !value.is_empty() {
                    out.insert(device_key(*index, *field), value.clone());
                }
            }
        }

        debug!(keys = out.len(), multi_device = multi, "assembled config options");
        out
    }

    /// Builds a fresh [`RunRequest`] for one submission.
    ///
    /// `seed` takes precedence over the seed loaded from the file.
    pub fn build_request(&self, trace_content: impl Into<String>, seed: Option<i64>) -> RunRequest {
        RunRequest {
            trace_content: trace_content.into(),
            seed: seed.or(self.seed),
            config_options: self.assemble(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn config_with(global: &[(&str, &str)]) -> RunConfig {
        let mut cfg = RunConfig {
            global: BTreeMap::new(),
            devices: BTreeMap::new(),
            seed: None,
        };
        for (k, v) in global {
            cfg.set_global(*k, *v);
        }
        cfg
    }

    // ── DeviceField ───────────────────────────────────────────────────────────

    #[test]
    fn device_field_names_round_trip() {
        for field in DeviceField::ALL {
            assert_eq!(field.as_str().parse::<DeviceField>(), Ok(field));
        }
    }

    #[test]
    fn global_only_fields_are_not_device_fields() {
        assert!(!DeviceField::is_device_field("num_gpus"));
        assert!(!DeviceField::is_device_field("scheduling"));
        assert!(DeviceField::is_device_field("decode_efficiency"));
    }

    #[test]
    fn device_key_format() {
        assert_eq!(device_key(3, DeviceField::VramBytes), "device 3 vram_bytes");
    }

    // ── device_count ──────────────────────────────────────────────────────────

    #[test]
    fn device_count_parses_num_gpus() {
        assert_eq!(config_with(&[("num_gpus", "4")]).device_count(), 4);
        assert_eq!(config_with(&[("num_gpus", " 2 ")]).device_count(), 2);
    }

    #[test]
    fn device_count_falls_back_to_one() {
        assert_eq!(config_with(&[]).device_count(), 1);
        assert_eq!(config_with(&[("num_gpus", "")]).device_count(), 1);
        assert_eq!(config_with(&[("num_gpus", "two")]).device_count(), 1);
        assert_eq!(config_with(&[("num_gpus", "-3")]).device_count(), 1);
        assert_eq!(config_with(&[("num_gpus", "0")]).device_count(), 1);
    }

    // ── assemble: single device ───────────────────────────────────────────────

    #[test]
    fn single_device_keeps_device_fields_bare() {
        let cfg = config_with(&[
            ("num_gpus", "1"),
            ("vram_bytes", "100"),
            ("decode_tps", "600"),
            ("scheduling", "fifo"),
        ]);
        let out = cfg.assemble();

        assert_eq!(out.get("vram_bytes").map(String::as_str), Some("100"));
        assert_eq!(out.get("decode_tps").map(String::as_str), Some("600"));
        assert_eq!(out.get("scheduling").map(String::as_str), Some("fifo"));
        assert!(out.keys().all(|k| !k.starts_with("device ")));
    }

    #[test]
    fn empty_global_values_are_omitted() {
        let cfg = config_with(&[("num_gpus", "1"), ("vram_bytes", ""), ("max_queue", "")]);
        let out = cfg.assemble();
        assert!(!out.contains_key("vram_bytes"));
        assert!(!out.contains_key("max_queue"));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn default_config_omits_memory_pressure_policy() {
        let out = RunConfig::new().assemble();
        assert!(!out.contains_key("memory_pressure_policy"));
        assert_eq!(out.get("num_gpus").map(String::as_str), Some("1"));
        assert_eq!(out.get("vram_bytes").map(String::as_str), Some("4294967296"));
    }

    // ── assemble: multi device ────────────────────────────────────────────────

    #[test]
    fn multi_device_suppresses_bare_device_fields() {
        let cfg = config_with(&[("num_gpus", "2"), ("vram_bytes", "100")]);
        let out = cfg.assemble();
        assert!(!out.contains_key("vram_bytes"));
        assert_eq!(out.get("num_gpus").map(String::as_str), Some("2"));
    }

    #[test]
    fn multi_device_suppresses_every_device_field_from_defaults() {
        let mut cfg = RunConfig::new();
        cfg.set_global("num_gpus", "3");
        let out = cfg.assemble();
        for field in DeviceField::ALL {
            assert!(!out.contains_key(field.as_str()), "{field} leaked globally");
        }
        assert_eq!(out.get("eviction_policy").map(String::as_str), Some("lru"));
    }

    #[test]
    fn overrides_are_namespaced_and_sparse() {
        let mut cfg = config_with(&[("num_gpus", "3"), ("scheduling", "fifo")]);
        cfg.set_device_override(0, DeviceField::VramBytes, "600000".into());
        cfg.set_device_override(2, DeviceField::DecodeTps, "700".into());
        let out = cfg.assemble();

        assert_eq!(
            out.get("device 0 vram_bytes").map(String::as_str),
            Some("600000")
        );
        assert_eq!(out.get("device 2 decode_tps").map(String::as_str), Some("700"));
        assert!(out.keys().all(|k| !k.starts_with("device 1 ")));
        assert!(!out.contains_key("device 0 scheduling"));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn empty_override_values_are_omitted() {
        let mut cfg = config_with(&[("num_gpus", "2")]);
        cfg.set_device_override(1, DeviceField::PrefillTps, String::new());
        let out = cfg.assemble();
        assert!(!out.contains_key("device 1 prefill_tps"));
    }

    #[test]
    fn overrides_beyond_device_count_pass_through() {
        let mut cfg = config_with(&[("num_gpus", "2")]);
        cfg.set_device_override(5, DeviceField::MaxConcurrent, "8".into());
        let out = cfg.assemble();
        assert_eq!(
            out.get("device 5 max_concurrent").map(String::as_str),
            Some("8")
        );
    }

    #[test]
    fn assemble_is_idempotent() {
        let mut cfg = RunConfig::new();
        cfg.set_global("num_gpus", "2");
        cfg.set_device_override(1, DeviceField::DecodeEfficiency, "0.7".into());
        assert_eq!(cfg.assemble(), cfg.assemble());
    }

    #[test]
    fn build_request_matches_reference_scenario() {
        let cfg = config_with(&[("num_gpus", "2"), ("vram_bytes", "100")]);
        let req = cfg.build_request("req1 0 200 400 0", None);

        assert_eq!(req.trace_content, "req1 0 200 400 0");
        assert_eq!(req.seed, None);
        assert!(!req.config_options.contains_key("vram_bytes"));
        assert_eq!(
            req.config_options.get("num_gpus").map(String::as_str),
            Some("2")
        );
    }

    #[test]
    fn explicit_seed_overrides_file_seed() {
        let mut cfg = RunConfig::new();
        cfg.seed = Some(7);
        assert_eq!(cfg.build_request("", None).seed, Some(7));
        assert_eq!(cfg.build_request("", Some(9)).seed, Some(9));
    }

    // ── Editor helpers ────────────────────────────────────────────────────────

    #[test]
    fn visible_global_fields_hide_device_fields_when_multi_device() {
        let cfg = config_with(&[("num_gpus", "2"), ("vram_bytes", "1"), ("max_queue", "4")]);
        let names: Vec<&str> = cfg.visible_global_fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["max_queue", "num_gpus"]);

        let single = config_with(&[("num_gpus", "1"), ("vram_bytes", "1")]);
        assert_eq!(single.visible_global_fields().len(), 2);
    }

    #[test]
    fn effective_device_value_falls_back_to_global() {
        let mut cfg = config_with(&[("num_gpus", "2"), ("decode_tps", "600")]);
        cfg.set_device_override(0, DeviceField::DecodeTps, "900".into());
        cfg.set_device_override(1, DeviceField::DecodeTps, String::new());

        assert_eq!(cfg.effective_device_value(0, DeviceField::DecodeTps), Some("900"));
        assert_eq!(cfg.effective_device_value(1, DeviceField::DecodeTps), Some("600"));
        assert_eq!(cfg.effective_device_value(1, DeviceField::VramBytes), None);
    }

    #[test]
    fn device_overrides_list_only_explicit_values() {
        let mut cfg = config_with(&[("num_gpus", "3"), ("decode_tps", "600")]);
        cfg.set_device_override(1, DeviceField::DecodeTps, "900".into());
        cfg.set_device_override(1, DeviceField::VramBytes, String::new());

        assert_eq!(cfg.device_overrides(1), vec![(DeviceField::DecodeTps, "900")]);
        assert!(cfg.device_overrides(0).is_empty());
        assert!(cfg.device_overrides(7).is_empty());
    }

    #[test]
    fn config_without_file_sends_built_in_defaults() {
        let out = RunConfig::new().assemble();
        let expected: BTreeMap<String, String> = default_global_fields()
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();
        assert_eq!(out, expected);
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_example_yaml() {
        let yaml = r#"
seed: 42
global:
  num_gpus: 2
  memory_pressure_policy: evict
  decode_efficiency: 0.75
  safe_reservation: true
devices:
  0:
    vram_bytes: 8589934592
  1:
    decode_tps: "700"
"#;
        let f = yaml_tempfile(yaml);
        let cfg = RunConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.device_count(), 2);
        assert_eq!(cfg.global["memory_pressure_policy"], "evict");
        assert_eq!(cfg.global["decode_efficiency"], "0.75");
        assert_eq!(cfg.global["safe_reservation"], "true");
        // defaults not mentioned in the file survive
        assert_eq!(cfg.global["eviction_policy"], "lru");

        let out = cfg.assemble();
        assert_eq!(out["device 0 vram_bytes"], "8589934592");
        assert_eq!(out["device 1 decode_tps"], "700");
        assert!(!out.contains_key("decode_efficiency"));
    }

    #[test]
    fn keys_without_value_mean_engine_default() {
        let yaml = "global:\n  memory_pressure_policy:\n  eviction_policy: ~\ndevices:\n  0:\n    decode_tps:\n";
        let cfg = RunConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(cfg.global["memory_pressure_policy"], "");
        assert_eq!(cfg.global["eviction_policy"], "");

        let out = cfg.assemble();
        assert!(!out.contains_key("memory_pressure_policy"));
        assert!(!out.contains_key("eviction_policy"));
        assert!(!out.contains_key("device 0 decode_tps"));
    }

    #[test]
    fn negative_seed_is_accepted() {
        let cfg = RunConfig::from_yaml_str("seed: -3\n").unwrap();
        assert_eq!(cfg.seed, Some(-3));
        assert_eq!(cfg.build_request("", None).seed, Some(-3));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let f = yaml_tempfile("{}\n");
        let cfg = RunConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg, RunConfig::new());
    }

    #[test]
    fn unknown_device_field_is_rejected() {
        let yaml = "devices:\n  0:\n    scheduling: fifo\n";
        let f = yaml_tempfile(yaml);
        assert!(RunConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = RunConfig::load_from_file(Path::new("/nonexistent/path/run.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(RunConfig::load_from_file(f.path()).is_err());
    }
}
