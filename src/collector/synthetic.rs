//! Synthetic frame generator.
//!
//! Produces plausible OBD-II telemetry without a vehicle: a warm-up phase,
//! steady cruising, and randomly arriving stress episodes where load, RPM
//! and coolant temperature climb together. Channels drop out occasionally
//! the way a flaky adapter's do. Deterministic for a given seed, which is
//! what makes it usable as a test fixture and a demo data source.

use crate::collector::types::SensorFrame;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Deterministic telemetry generator for one driving session.
pub struct SyntheticGenerator {
    rng: StdRng,
    session_id: String,
    clock: DateTime<Utc>,
    tick: u64,
    coolant_temp: f64,
    stress_ticks_left: u32,
    dtc_count: u32,
}

impl SyntheticGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_start(seed, Utc::now())
    }

    /// Generator with a fixed start time, for reproducible captures.
    pub fn with_start(seed: u64, start: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            session_id: Uuid::new_v4().to_string(),
            clock: start,
            tick: 0,
            coolant_temp: 70.0,
            stress_ticks_left: 0,
            dtc_count: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Produce the next frame, one simulated second after the previous.
    pub fn next_frame(&mut self) -> SensorFrame {
        self.tick += 1;
        self.clock += ChronoDuration::seconds(1);

        if self.stress_ticks_left == 0 && self.rng.gen_bool(0.08) {
            self.stress_ticks_left = self.rng.gen_range(5..=15);
        }
        let stressed = self.stress_ticks_left > 0;
        if stressed {
            self.stress_ticks_left -= 1;
        }

        // Coolant trends toward its regime's equilibrium.
        let target = if stressed { 108.0 } else { 90.0 };
        self.coolant_temp += (target - self.coolant_temp) * 0.08
            + self.rng.gen_range(-0.3..0.3);

        // Trouble codes arrive rarely and clear even more rarely.
        if self.dtc_count == 0 && self.rng.gen_bool(0.005) {
            self.dtc_count = self.rng.gen_range(1..=4);
        } else if self.dtc_count > 0 && self.rng.gen_bool(0.002) {
            self.dtc_count = 0;
        }

        let (rpm, load, throttle, speed) = if stressed {
            (
                self.rng.gen_range(3200.0..4800.0),
                self.rng.gen_range(72.0..94.0),
                self.rng.gen_range(60.0..95.0),
                self.rng.gen_range(70.0..130.0),
            )
        } else {
            (
                self.rng.gen_range(850.0..2400.0),
                self.rng.gen_range(15.0..45.0),
                self.rng.gen_range(5.0..30.0),
                self.rng.gen_range(0.0..90.0),
            )
        };

        let mut frame = SensorFrame::at(self.clock, &self.session_id);
        frame.rpm = Some(rpm);
        frame.speed = Some(speed);
        frame.coolant_temp = Some(self.coolant_temp);
        frame.engine_load = Some(load);
        frame.throttle_pos = Some(throttle);
        frame.intake_temp = Some(self.rng.gen_range(20.0..45.0));
        frame.timing_advance = Some(self.rng.gen_range(5.0..25.0));
        frame.run_time = Some(self.tick as f64);
        frame.fuel_level = Some((80.0 - self.tick as f64 * 0.002).max(5.0));
        frame.fuel_pressure = Some(self.rng.gen_range(280.0..420.0));
        frame.short_fuel_trim_1 = Some(self.rng.gen_range(-8.0..8.0));
        frame.long_fuel_trim_1 = Some(self.rng.gen_range(-5.0..5.0));
        frame.maf = Some(if stressed {
            self.rng.gen_range(25.0..60.0)
        } else {
            self.rng.gen_range(2.0..15.0)
        });
        frame.intake_pressure = Some(self.rng.gen_range(25.0..95.0));
        frame.barometric_pressure = Some(101.0);
        frame.o2_b1s1 = Some(self.rng.gen_range(0.2..0.7));
        frame.catalyst_temp_b1s1 = Some(if stressed {
            self.rng.gen_range(600.0..850.0)
        } else {
            self.rng.gen_range(350.0..550.0)
        });
        frame.ambient_air_temp = Some(22.0);
        frame.control_module_voltage = Some(self.rng.gen_range(13.2..14.6));
        frame.dtc_count = Some(self.dtc_count);
        frame.mil_on = Some(self.dtc_count > 0);
        frame.distance_w_mil = Some(if self.dtc_count > 0 {
            self.rng.gen_range(1.0..80.0)
        } else {
            0.0
        });

        // A flaky adapter drops a channel or two now and then.
        if self.rng.gen_bool(0.05) {
            frame.maf = None;
            frame.o2_b1s1 = None;
        }
        if self.rng.gen_bool(0.02) {
            frame.fuel_pressure = None;
            frame.fuel_level = None;
        }

        frame
    }
}

/// Errors that can occur during synthetic collection.
#[derive(Debug)]
pub enum SyntheticError {
    AlreadyRunning,
    /// The collector ran once and handed its generator to the thread; it
    /// cannot restart
    Finished,
}

impl std::fmt::Display for SyntheticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntheticError::AlreadyRunning => write!(f, "Synthetic collector is already running"),
            SyntheticError::Finished => {
                write!(f, "Synthetic collector has already run and cannot be restarted")
            }
        }
    }
}

impl std::error::Error for SyntheticError {}

/// Emits generated frames on a background thread at a fixed cadence.
pub struct SyntheticCollector {
    generator: Option<SyntheticGenerator>,
    interval: Duration,
    sender: Option<Sender<SensorFrame>>,
    receiver: Receiver<SensorFrame>,
    running: Arc<AtomicBool>,
}

impl SyntheticCollector {
    pub fn new(seed: u64, interval: Duration) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            generator: Some(SyntheticGenerator::new(seed)),
            interval,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start emitting frames.
    pub fn start(&mut self) -> Result<(), SyntheticError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SyntheticError::AlreadyRunning);
        }
        let (Some(sender), Some(mut generator)) = (self.sender.take(), self.generator.take())
        else {
            return Err(SyntheticError::Finished);
        };

        let interval = self.interval;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if sender.send(generator.next_frame()).is_err() {
                    break;
                }
                thread::sleep(interval);
            }
        });
        Ok(())
    }

    /// Stop emitting frames.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for generated frames.
    pub fn receiver(&self) -> &Receiver<SensorFrame> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_deterministic() {
        let start = Utc::now();
        let mut a = SyntheticGenerator::with_start(9, start);
        let mut b = SyntheticGenerator::with_start(9, start);

        for _ in 0..50 {
            let fa = a.next_frame();
            let fb = b.next_frame();
            assert_eq!(fa.rpm, fb.rpm);
            assert_eq!(fa.coolant_temp, fb.coolant_temp);
            assert_eq!(fa.dtc_count, fb.dtc_count);
        }
    }

    #[test]
    fn test_frames_share_one_session_and_advance_time() {
        let mut generator = SyntheticGenerator::new(3);
        let first = generator.next_frame();
        let second = generator.next_frame();

        assert_eq!(first.session_id, second.session_id);
        assert!(second.timestamp > first.timestamp);
        assert!(first.rpm.is_some());
        assert!(first.coolant_temp.is_some());
    }

    #[test]
    fn test_long_run_visits_multiple_regimes() {
        let mut generator = SyntheticGenerator::new(42);
        let mut max_load: f64 = 0.0;
        let mut min_load = f64::MAX;
        for _ in 0..500 {
            if let Some(load) = generator.next_frame().engine_load {
                max_load = max_load.max(load);
                min_load = min_load.min(load);
            }
        }
        assert!(max_load > 70.0, "stress episodes should push load high");
        assert!(min_load < 45.0, "calm driving should keep load low");
    }

    #[test]
    fn test_collector_emits_and_stops() {
        let mut collector = SyntheticCollector::new(1, Duration::from_millis(1));
        collector.start().unwrap();

        let frame = collector
            .receiver()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(frame.rpm.is_some());

        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_start_after_stop_reports_finished() {
        let mut collector = SyntheticCollector::new(1, Duration::from_millis(1));
        collector.start().unwrap();
        collector.stop();
        assert!(matches!(collector.start(), Err(SyntheticError::Finished)));
    }

    #[test]
    fn test_double_start_rejected_while_running() {
        let mut collector = SyntheticCollector::new(1, Duration::from_millis(1));
        collector.start().unwrap();
        assert!(matches!(
            collector.start(),
            Err(SyntheticError::AlreadyRunning)
        ));
    }
}
