//! Real-time feature derivation from sensor frames.
//!
//! All derived values are best-effort: if a required channel is absent the
//! value is `None`, never an error and never a NaN that could leak into
//! storage. The gradient feature needs the previous frame of the *same*
//! session, which is held in a [`SessionContext`] owned by the caller.

use crate::collector::types::SensorFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fuel density used by the consumption estimate, kg/L (gasoline).
const FUEL_DENSITY_KG_PER_L: f64 = 0.75;

/// Features derived from a single frame (plus the previous same-session
/// frame for the gradient). `None` means undefined, not zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DerivedFeatures {
    /// (engine_load / rpm) * 1000; undefined when rpm is absent or zero
    pub load_rpm_ratio: Option<f64>,
    /// Coolant temperature change in °C per minute since the previous frame
    pub temp_gradient: Option<f64>,
    /// Estimated consumption in L/100km; undefined when stationary or
    /// without a MAF sensor
    pub fuel_efficiency: Option<f64>,
}

/// Per-session mutable state for gradient computation.
///
/// One instance exists per active vehicle connection and is discarded on
/// disconnect. It must never be shared across sessions: a gradient computed
/// against another vehicle's previous frame would be meaningless.
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    prev_coolant_temp: Option<f64>,
    prev_timestamp: Option<DateTime<Utc>>,
}

impl SessionContext {
    /// Create a fresh context for a new session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            prev_coolant_temp: None,
            prev_timestamp: None,
        }
    }

    /// The session this context belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Derive features for a frame and advance the previous-frame state.
    ///
    /// A frame from a different session resets the context first, so stale
    /// state can never bleed into another session's gradient.
    pub fn derive(&mut self, frame: &SensorFrame) -> DerivedFeatures {
        if frame.session_id != self.session_id {
            self.session_id = frame.session_id.clone();
            self.prev_coolant_temp = None;
            self.prev_timestamp = None;
        }

        let load_rpm_ratio = match (frame.engine_load, frame.rpm) {
            (Some(load), Some(rpm)) if rpm > 0.0 => Some((load / rpm) * 1000.0),
            _ => None,
        };

        let temp_gradient = match (frame.coolant_temp, self.prev_coolant_temp, self.prev_timestamp)
        {
            (Some(temp), Some(prev_temp), Some(prev_ts)) => {
                let elapsed_minutes =
                    (frame.timestamp - prev_ts).num_milliseconds() as f64 / 60_000.0;
                if elapsed_minutes > 0.0 {
                    Some((temp - prev_temp) / elapsed_minutes)
                } else {
                    None
                }
            }
            _ => None,
        };

        // MAF (g/s) -> L/h via fuel density, normalized per 100 km.
        let fuel_efficiency = match (frame.maf, frame.speed) {
            (Some(maf), Some(speed)) if speed > 0.0 => {
                Some(maf / 1000.0 / FUEL_DENSITY_KG_PER_L / speed * 3600.0 * 100.0)
            }
            _ => None,
        };

        self.prev_coolant_temp = frame.coolant_temp;
        self.prev_timestamp = Some(frame.timestamp);

        DerivedFeatures {
            load_rpm_ratio,
            temp_gradient,
            fuel_efficiency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn frame_at(offset_secs: i64) -> SensorFrame {
        SensorFrame::at(Utc::now() + Duration::seconds(offset_secs), "s1")
    }

    #[test]
    fn test_load_rpm_ratio_zero_rpm_is_undefined() {
        let mut ctx = SessionContext::new("s1");
        let mut frame = frame_at(0);
        frame.rpm = Some(0.0);
        frame.engine_load = Some(40.0);

        let derived = ctx.derive(&frame);
        assert!(derived.load_rpm_ratio.is_none());
    }

    #[test]
    fn test_load_rpm_ratio_formula() {
        let mut ctx = SessionContext::new("s1");
        let mut frame = frame_at(0);
        frame.rpm = Some(2000.0);
        frame.engine_load = Some(40.0);

        let derived = ctx.derive(&frame);
        assert_eq!(derived.load_rpm_ratio, Some(20.0));
    }

    #[test]
    fn test_temp_gradient_exact() {
        let mut ctx = SessionContext::new("s1");
        let mut first = frame_at(0);
        first.coolant_temp = Some(80.0);
        assert!(ctx.derive(&first).temp_gradient.is_none());

        // 30 seconds later, 2 degrees hotter: 4 °C/min.
        let mut second = first.clone();
        second.timestamp = first.timestamp + Duration::seconds(30);
        second.coolant_temp = Some(82.0);

        let derived = ctx.derive(&second);
        assert_eq!(derived.temp_gradient, Some(4.0));
    }

    #[test]
    fn test_temp_gradient_requires_positive_elapsed() {
        let mut ctx = SessionContext::new("s1");
        let mut first = frame_at(0);
        first.coolant_temp = Some(80.0);
        ctx.derive(&first);

        // Same timestamp: elapsed is zero, gradient undefined.
        let mut second = first.clone();
        second.coolant_temp = Some(85.0);
        assert!(ctx.derive(&second).temp_gradient.is_none());
    }

    #[test]
    fn test_session_change_resets_gradient_state() {
        let mut ctx = SessionContext::new("s1");
        let mut first = frame_at(0);
        first.coolant_temp = Some(80.0);
        ctx.derive(&first);

        let mut other = SensorFrame::at(first.timestamp + Duration::seconds(60), "s2");
        other.coolant_temp = Some(100.0);

        // First frame of a new session never has a gradient.
        assert!(ctx.derive(&other).temp_gradient.is_none());
        assert_eq!(ctx.session_id(), "s2");
    }

    #[test]
    fn test_fuel_efficiency_undefined_when_stationary_or_no_maf() {
        let mut ctx = SessionContext::new("s1");
        let mut stationary = frame_at(0);
        stationary.maf = Some(12.0);
        stationary.speed = Some(0.0);
        assert!(ctx.derive(&stationary).fuel_efficiency.is_none());

        let mut no_maf = frame_at(1);
        no_maf.speed = Some(60.0);
        assert!(ctx.derive(&no_maf).fuel_efficiency.is_none());
    }

    #[test]
    fn test_fuel_efficiency_formula() {
        let mut ctx = SessionContext::new("s1");
        let mut frame = frame_at(0);
        frame.maf = Some(7.5);
        frame.speed = Some(60.0);

        // 7.5 g/s at 60 km/h: 7.5/1000/0.75/60*3600*100 = 60 L/100km.
        let derived = ctx.derive(&frame);
        let value = derived.fuel_efficiency.unwrap();
        assert!((value - 60.0).abs() < 1e-9);
    }
}
