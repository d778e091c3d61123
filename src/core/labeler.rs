//! Rule-based health auto-labeler.
//!
//! A declarative table of weighted stress factors sums into a stress score,
//! which is bucketed into one of four health labels. A second table of hard
//! overrides bypasses the score entirely and forces `Critical`. The labeler
//! is a pure function of the frame and its derived features; identical
//! inputs always yield the identical label.

use crate::collector::types::SensorFrame;
use crate::core::features::DerivedFeatures;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete vehicle health classification, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthLabel {
    Normal,
    Advisory,
    Warning,
    Critical,
}

impl HealthLabel {
    /// All labels in severity order.
    pub const ALL: [HealthLabel; 4] = [
        HealthLabel::Normal,
        HealthLabel::Advisory,
        HealthLabel::Warning,
        HealthLabel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Normal => "NORMAL",
            HealthLabel::Advisory => "ADVISORY",
            HealthLabel::Warning => "WARNING",
            HealthLabel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score reported when a hard override fires, above any reachable sum.
pub const OVERRIDE_SCORE: u32 = 15;

/// One weighted factor in the stress table.
pub struct StressFactor {
    pub id: &'static str,
    /// Points this factor contributes for a given frame. An absent channel
    /// contributes nothing.
    pub points: fn(&SensorFrame, &DerivedFeatures) -> u32,
}

/// A condition that forces `Critical` regardless of the accumulated score.
pub struct CriticalOverride {
    pub id: &'static str,
    pub triggered: fn(&SensorFrame) -> bool,
}

/// Conditions severe enough that scoring them would understate the danger.
pub const OVERRIDES: &[CriticalOverride] = &[
    CriticalOverride {
        id: "severe_overheating",
        triggered: |f| f.coolant_temp.is_some_and(|t| t > 110.0),
    },
    CriticalOverride {
        id: "battery_failing",
        triggered: |f| f.control_module_voltage.is_some_and(|v| v < 11.0),
    },
    CriticalOverride {
        id: "trouble_code_flood",
        triggered: |f| f.dtc_count.is_some_and(|n| n > 10),
    },
    CriticalOverride {
        id: "catalyst_overtemp",
        triggered: |f| f.catalyst_temp_b1s1.is_some_and(|t| t > 900.0),
    },
    CriticalOverride {
        id: "extreme_engine_load",
        triggered: |f| f.engine_load.is_some_and(|l| l > 95.0),
    },
];

/// The weighted factor table. Thresholds live here and only here.
pub const FACTORS: &[StressFactor] = &[
    StressFactor {
        id: "engine_load",
        points: |f, _| match f.engine_load {
            Some(l) if l > 85.0 => 3,
            Some(l) if l > 70.0 => 2,
            Some(l) if l > 50.0 => 1,
            _ => 0,
        },
    },
    StressFactor {
        id: "rpm_load_mismatch",
        points: |f, _| match (f.rpm, f.engine_load) {
            // High revs against low load: wrong gear or free-revving.
            (Some(rpm), Some(load)) if rpm > 3500.0 && load < 30.0 => 2,
            (Some(rpm), _) if rpm > 4500.0 => 2,
            _ => 0,
        },
    },
    StressFactor {
        id: "coolant_temp",
        points: |f, _| match f.coolant_temp {
            Some(t) if t > 105.0 => 3,
            Some(t) if t > 100.0 => 2,
            Some(t) if t > 95.0 => 1,
            _ => 0,
        },
    },
    StressFactor {
        id: "voltage_band",
        points: |f, _| match f.control_module_voltage {
            Some(v) if v < 12.0 => 2,
            Some(v) if v < 13.0 => 1,
            Some(v) if v > 15.0 => 2,
            _ => 0,
        },
    },
    StressFactor {
        id: "fuel_trim",
        points: |f, _| {
            let short = f.short_fuel_trim_1.map_or(0.0, f64::abs);
            let long = f.long_fuel_trim_1.map_or(0.0, f64::abs);
            if short > 20.0 || long > 15.0 {
                2
            } else if short > 10.0 || long > 8.0 {
                1
            } else {
                0
            }
        },
    },
    StressFactor {
        id: "o2_deviation",
        points: |f, _| match f.o2_b1s1 {
            // 0.45 V is the ideal stoichiometric midpoint.
            Some(v) if (v - 0.45).abs() > 0.3 => 1,
            _ => 0,
        },
    },
    StressFactor {
        id: "trouble_codes",
        points: |f, _| match f.dtc_count {
            Some(n) if n >= 3 => 2,
            Some(n) if n >= 1 => 1,
            _ => 0,
        },
    },
    StressFactor {
        id: "mil_active",
        points: |f, _| u32::from(f.mil_on == Some(true)) * 2,
    },
    StressFactor {
        id: "distance_with_mil",
        points: |f, _| u32::from(f.distance_w_mil.is_some_and(|d| d > 50.0)),
    },
];

/// The outcome of assessing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressReport {
    /// Sum of factor points, or [`OVERRIDE_SCORE`] when an override fired
    pub score: u32,
    pub label: HealthLabel,
    /// Which override forced `Critical`, if any
    pub override_id: Option<&'static str>,
}

/// Assess a frame against the override and factor tables.
pub fn assess(frame: &SensorFrame, derived: &DerivedFeatures) -> StressReport {
    for rule in OVERRIDES {
        if (rule.triggered)(frame) {
            return StressReport {
                score: OVERRIDE_SCORE,
                label: HealthLabel::Critical,
                override_id: Some(rule.id),
            };
        }
    }

    let score: u32 = FACTORS.iter().map(|f| (f.points)(frame, derived)).sum();

    StressReport {
        score,
        label: bucket(score),
        override_id: None,
    }
}

/// Map a stress score onto a label. Monotonic in the score.
fn bucket(score: u32) -> HealthLabel {
    match score {
        0..=2 => HealthLabel::Normal,
        3..=5 => HealthLabel::Advisory,
        6..=9 => HealthLabel::Warning,
        _ => HealthLabel::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_frame() -> SensorFrame {
        let mut frame = SensorFrame::new("s1");
        frame.engine_load = Some(28.0);
        frame.rpm = Some(1000.0);
        frame.coolant_temp = Some(85.0);
        frame.control_module_voltage = Some(14.0);
        frame.dtc_count = Some(0);
        frame.mil_on = Some(false);
        frame
    }

    #[test]
    fn test_calm_frame_scores_zero_and_normal() {
        let report = assess(&calm_frame(), &DerivedFeatures::default());
        assert_eq!(report.score, 0);
        assert_eq!(report.label, HealthLabel::Normal);
        assert!(report.override_id.is_none());
    }

    #[test]
    fn test_labeler_is_pure() {
        let mut frame = calm_frame();
        frame.coolant_temp = Some(101.0);
        frame.dtc_count = Some(2);

        let derived = DerivedFeatures::default();
        let first = assess(&frame, &derived);
        for _ in 0..10 {
            assert_eq!(assess(&frame, &derived), first);
        }
    }

    #[test]
    fn test_extreme_load_override_dominates_score() {
        // Two contrasting settings of every other factor: an otherwise calm
        // frame and an already heavily stressed one must both come out
        // Critical once engine_load crosses the override threshold.
        let mut calm = calm_frame();
        calm.engine_load = Some(96.0);
        let report = assess(&calm, &DerivedFeatures::default());
        assert_eq!(report.label, HealthLabel::Critical);
        assert_eq!(report.score, OVERRIDE_SCORE);
        assert_eq!(report.override_id, Some("extreme_engine_load"));

        let mut stressed = SensorFrame::new("s1");
        stressed.engine_load = Some(96.0);
        stressed.rpm = Some(5000.0);
        stressed.coolant_temp = Some(104.0);
        stressed.control_module_voltage = Some(11.5);
        stressed.short_fuel_trim_1 = Some(25.0);
        stressed.o2_b1s1 = Some(0.1);
        stressed.dtc_count = Some(4);
        stressed.mil_on = Some(true);
        stressed.distance_w_mil = Some(120.0);
        let report = assess(&stressed, &DerivedFeatures::default());
        assert_eq!(report.label, HealthLabel::Critical);
        assert_eq!(report.override_id, Some("extreme_engine_load"));
    }

    #[test]
    fn test_overheating_override() {
        let mut frame = calm_frame();
        frame.coolant_temp = Some(111.0);
        let report = assess(&frame, &DerivedFeatures::default());
        assert_eq!(report.label, HealthLabel::Critical);
        assert_eq!(report.override_id, Some("severe_overheating"));
    }

    #[test]
    fn test_absent_channels_contribute_no_points() {
        let frame = SensorFrame::new("s1");
        let report = assess(&frame, &DerivedFeatures::default());
        assert_eq!(report.score, 0);
        assert_eq!(report.label, HealthLabel::Normal);
    }

    #[test]
    fn test_score_buckets() {
        assert_eq!(bucket(0), HealthLabel::Normal);
        assert_eq!(bucket(2), HealthLabel::Normal);
        assert_eq!(bucket(3), HealthLabel::Advisory);
        assert_eq!(bucket(5), HealthLabel::Advisory);
        assert_eq!(bucket(6), HealthLabel::Warning);
        assert_eq!(bucket(9), HealthLabel::Warning);
        assert_eq!(bucket(10), HealthLabel::Critical);
        assert_eq!(bucket(OVERRIDE_SCORE), HealthLabel::Critical);
    }

    #[test]
    fn test_factor_accumulation() {
        // Hot engine under high load with a lit MIL: 2 (load 70..85)
        // + 2 (coolant 100..105) + 2 (MIL) = 6 -> Warning.
        let mut frame = calm_frame();
        frame.engine_load = Some(75.0);
        frame.coolant_temp = Some(102.0);
        frame.mil_on = Some(true);

        let report = assess(&frame, &DerivedFeatures::default());
        assert_eq!(report.score, 6);
        assert_eq!(report.label, HealthLabel::Warning);
    }

    #[test]
    fn test_rpm_load_mismatch_points() {
        let mut frame = calm_frame();
        frame.rpm = Some(4000.0);
        frame.engine_load = Some(20.0);
        let report = assess(&frame, &DerivedFeatures::default());
        assert_eq!(report.score, 2);

        // Very high RPM scores even with healthy load.
        let mut frame = calm_frame();
        frame.rpm = Some(4800.0);
        frame.engine_load = Some(40.0);
        let report = assess(&frame, &DerivedFeatures::default());
        assert_eq!(report.score, 2);
    }

    #[test]
    fn test_label_severity_ordering() {
        assert!(HealthLabel::Normal < HealthLabel::Advisory);
        assert!(HealthLabel::Advisory < HealthLabel::Warning);
        assert!(HealthLabel::Warning < HealthLabel::Critical);
    }

    #[test]
    fn test_label_serialization() {
        let json = serde_json::to_string(&HealthLabel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: HealthLabel = serde_json::from_str("\"ADVISORY\"").unwrap();
        assert_eq!(back, HealthLabel::Advisory);
    }
}
