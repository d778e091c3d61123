//! Frame types for the vehicle health agent.
//!
//! A `SensorFrame` is one timestamped snapshot of diagnostic-bus channel
//! values. Channels a vehicle does not support are `None` - "missing" and
//! "reads zero" are never conflated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped snapshot of sensor channel values.
///
/// Every numeric channel is optional: an ECU that does not implement a PID
/// simply yields `None` for it, and downstream math treats that explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorFrame {
    /// When the frame was read from the bus
    pub timestamp: DateTime<Utc>,
    /// Connection session this frame belongs to
    pub session_id: String,

    // Core engine
    pub rpm: Option<f64>,
    /// Vehicle speed in km/h
    pub speed: Option<f64>,
    /// Coolant temperature in °C
    pub coolant_temp: Option<f64>,
    /// Calculated engine load in percent
    pub engine_load: Option<f64>,
    /// Throttle position in percent
    pub throttle_pos: Option<f64>,
    /// Intake air temperature in °C
    pub intake_temp: Option<f64>,
    /// Ignition timing advance in degrees
    pub timing_advance: Option<f64>,
    /// Engine run time since start in seconds
    pub run_time: Option<f64>,

    // Fuel system
    pub fuel_level: Option<f64>,
    pub fuel_pressure: Option<f64>,
    /// Short-term fuel trim, bank 1, percent
    pub short_fuel_trim_1: Option<f64>,
    /// Long-term fuel trim, bank 1, percent
    pub long_fuel_trim_1: Option<f64>,

    // Air intake
    /// Mass air flow in g/s
    pub maf: Option<f64>,
    pub intake_pressure: Option<f64>,
    pub barometric_pressure: Option<f64>,

    // Emissions
    /// Oxygen sensor voltage, bank 1 sensor 1
    pub o2_b1s1: Option<f64>,
    /// Catalyst temperature, bank 1 sensor 1, °C
    pub catalyst_temp_b1s1: Option<f64>,

    // Environment / electrical
    pub ambient_air_temp: Option<f64>,
    /// Control module voltage (battery/charging system)
    pub control_module_voltage: Option<f64>,

    // Diagnostics
    /// Number of stored diagnostic trouble codes
    pub dtc_count: Option<u32>,
    /// Whether the malfunction indicator lamp is lit
    pub mil_on: Option<bool>,
    /// Distance driven with the MIL on, km
    pub distance_w_mil: Option<f64>,
}

impl SensorFrame {
    /// Create an empty frame (all channels absent) for the given session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::at(Utc::now(), session_id)
    }

    /// Create an empty frame with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, session_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            rpm: None,
            speed: None,
            coolant_temp: None,
            engine_load: None,
            throttle_pos: None,
            intake_temp: None,
            timing_advance: None,
            run_time: None,
            fuel_level: None,
            fuel_pressure: None,
            short_fuel_trim_1: None,
            long_fuel_trim_1: None,
            maf: None,
            intake_pressure: None,
            barometric_pressure: None,
            o2_b1s1: None,
            catalyst_temp_b1s1: None,
            ambient_air_temp: None,
            control_module_voltage: None,
            dtc_count: None,
            mil_on: None,
            distance_w_mil: None,
        }
    }

    /// Number of channels that carried a reading.
    pub fn present_channel_count(&self) -> usize {
        [
            self.rpm,
            self.speed,
            self.coolant_temp,
            self.engine_load,
            self.throttle_pos,
            self.intake_temp,
            self.timing_advance,
            self.run_time,
            self.fuel_level,
            self.fuel_pressure,
            self.short_fuel_trim_1,
            self.long_fuel_trim_1,
            self.maf,
            self.intake_pressure,
            self.barometric_pressure,
            self.o2_b1s1,
            self.catalyst_temp_b1s1,
            self.ambient_air_temp,
            self.control_module_voltage,
            self.distance_w_mil,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
            + usize::from(self.dtc_count.is_some())
            + usize::from(self.mil_on.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_has_no_channels() {
        let frame = SensorFrame::new("s1");
        assert_eq!(frame.present_channel_count(), 0);
        assert!(frame.rpm.is_none());
    }

    #[test]
    fn test_missing_and_zero_are_distinct() {
        let mut frame = SensorFrame::new("s1");
        frame.speed = Some(0.0);
        assert_eq!(frame.speed, Some(0.0));
        assert!(frame.maf.is_none());
        assert_eq!(frame.present_channel_count(), 1);
    }

    #[test]
    fn test_frame_json_round_trip() {
        let mut frame = SensorFrame::new("s1");
        frame.rpm = Some(1850.0);
        frame.mil_on = Some(false);

        let json = serde_json::to_string(&frame).unwrap();
        let back: SensorFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rpm, Some(1850.0));
        assert_eq!(back.mil_on, Some(false));
        assert!(back.coolant_temp.is_none());
    }
}
