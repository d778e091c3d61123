//! Labeled record schema, feature lookup, and the record store.
//!
//! A `TrainingRecord` is one frame with its derived features, stress score
//! and label, persisted append-only as JSON Lines. The named-feature lookup
//! in [`feature_value`] is the single source of truth for turning a record
//! (or a live frame) into a numeric vector: training and inference both go
//! through it, keyed by the feature names the model artifact declares.

use crate::collector::types::SensorFrame;
use crate::core::features::DerivedFeatures;
use crate::core::labeler::HealthLabel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// One persisted labeled observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecord {
    #[serde(flatten)]
    pub frame: SensorFrame,
    #[serde(flatten)]
    pub derived: DerivedFeatures,
    /// Stress score assigned by the rule table
    pub engine_stress_score: u32,
    /// Ground-truth label assigned by the auto-labeler
    pub health_status: HealthLabel,
}

/// Canonical feature column order used when a new model is trained.
///
/// This list seeds the artifact metadata; after training, the metadata copy
/// is authoritative and this constant is never consulted at inference time.
pub const FEATURE_COLUMNS: &[&str] = &[
    // Raw channels
    "rpm",
    "speed",
    "coolant_temp",
    "engine_load",
    "throttle_pos",
    "intake_temp",
    "control_module_voltage",
    "intake_pressure",
    "fuel_level",
    "barometric_pressure",
    "ambient_air_temp",
    "run_time",
    "distance_w_mil",
    "fuel_pressure",
    "timing_advance",
    "maf",
    // Rule-table output
    "engine_stress_score",
    // Real-time derived
    "load_rpm_ratio",
    "temp_gradient",
    "fuel_efficiency",
    // Training-time engineered ratios
    "rpm_load_ratio",
    "temp_efficiency",
    "speed_throttle_ratio",
    // Binary indicators
    "high_rpm",
    "low_speed",
    "high_throttle",
    "voltage_health",
    "stress_indicator",
];

/// Channels a usable record is expected to carry.
pub const CRITICAL_CHANNELS: &[&str] = &[
    "rpm",
    "speed",
    "coolant_temp",
    "engine_load",
    "throttle_pos",
    "control_module_voltage",
];

/// A record missing more than this many critical channels is unusable.
pub const MISSING_CHANNEL_TOLERANCE: usize = 2;

/// Number of critical channels absent from a record.
pub fn missing_critical_count(frame: &SensorFrame) -> usize {
    [
        frame.rpm,
        frame.speed,
        frame.coolant_temp,
        frame.engine_load,
        frame.throttle_pos,
        frame.control_module_voltage,
    ]
    .iter()
    .filter(|v| v.is_none())
    .count()
}

/// Quality filter applied before training.
pub fn passes_quality_filter(record: &TrainingRecord) -> bool {
    missing_critical_count(&record.frame) <= MISSING_CHANNEL_TOLERANCE
}

/// Look up a named feature from a frame and its derived values.
///
/// Missing channels, undefined derived values, and non-finite intermediate
/// results all collapse to 0.0 here, so nothing downstream ever sees a NaN
/// or infinity. Unknown names also read as 0.0, which is what makes a
/// metadata-declared superset tolerable at inference time.
pub fn feature_value(
    frame: &SensorFrame,
    derived: &DerivedFeatures,
    stress_score: u32,
    name: &str,
) -> f64 {
    let value = match name {
        "rpm" => frame.rpm,
        "speed" => frame.speed,
        "coolant_temp" => frame.coolant_temp,
        "engine_load" => frame.engine_load,
        "throttle_pos" => frame.throttle_pos,
        "intake_temp" => frame.intake_temp,
        "control_module_voltage" => frame.control_module_voltage,
        "intake_pressure" => frame.intake_pressure,
        "fuel_level" => frame.fuel_level,
        "barometric_pressure" => frame.barometric_pressure,
        "ambient_air_temp" => frame.ambient_air_temp,
        "run_time" => frame.run_time,
        "distance_w_mil" => frame.distance_w_mil,
        "fuel_pressure" => frame.fuel_pressure,
        "timing_advance" => frame.timing_advance,
        "maf" => frame.maf,
        "engine_stress_score" => Some(f64::from(stress_score)),
        "load_rpm_ratio" => derived.load_rpm_ratio,
        "temp_gradient" => derived.temp_gradient,
        "fuel_efficiency" => derived.fuel_efficiency,
        "rpm_load_ratio" => ratio(frame.rpm, frame.engine_load),
        "temp_efficiency" => ratio(frame.engine_load, frame.coolant_temp),
        "speed_throttle_ratio" => ratio(frame.speed, frame.throttle_pos),
        "high_rpm" => indicator(frame.rpm.map(|v| v > 3000.0)),
        "low_speed" => indicator(frame.speed.map(|v| v < 20.0)),
        "high_throttle" => indicator(frame.throttle_pos.map(|v| v > 70.0)),
        "voltage_health" => indicator(
            frame
                .control_module_voltage
                .map(|v| (12.5..=14.5).contains(&v)),
        ),
        "stress_indicator" => Some(
            0.3 * feature_value(frame, derived, stress_score, "high_rpm")
                + 0.3 * feature_value(frame, derived, stress_score, "high_throttle")
                + 0.4 * indicator(frame.coolant_temp.map(|t| t > 95.0)).unwrap_or(0.0),
        ),
        _ => None,
    };
    sanitize(value)
}

/// Build the vector for an ordered list of feature names.
pub fn feature_vector(
    frame: &SensorFrame,
    derived: &DerivedFeatures,
    stress_score: u32,
    names: &[String],
) -> Vec<f64> {
    names
        .iter()
        .map(|name| feature_value(frame, derived, stress_score, name))
        .collect()
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    }
}

fn indicator(condition: Option<bool>) -> Option<f64> {
    condition.map(|c| if c { 1.0 } else { 0.0 })
}

fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Errors from the JSONL record store.
#[derive(Debug)]
pub enum DatasetError {
    Io(String),
    Parse { line: usize, message: String },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Io(e) => write!(f, "record store IO error: {e}"),
            DatasetError::Parse { line, message } => {
                write!(f, "bad record on line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for DatasetError {}

/// Read every record from a JSONL file. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<TrainingRecord>, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::Io(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DatasetError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| DatasetError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Append a batch of records to a JSONL file, creating it if needed.
pub fn append_records(path: &Path, records: &[TrainingRecord]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::Io(e.to_string()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DatasetError::Io(e.to_string()))?;

    for record in records {
        let line =
            serde_json::to_string(record).map_err(|e| DatasetError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| DatasetError::Io(e.to_string()))?;
    }
    Ok(())
}

/// Write records to a JSONL file, replacing any existing content.
pub fn write_records(path: &Path, records: &[TrainingRecord]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::Io(e.to_string()))?;
    }
    let mut out = String::new();
    for record in records {
        let line =
            serde_json::to_string(record).map_err(|e| DatasetError::Io(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|e| DatasetError::Io(e.to_string()))
}
