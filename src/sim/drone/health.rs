use rand::{Rng, seq::IndexedRandom};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use crate::sim::round_to;

use super::state::{FlightState, Sensor, SensorHealth, SensorStatus};

const BASE_SATELLITES: u32 = 10;
const MAX_SATELLITES: u32 = 20;
const MIN_SATELLITES: u32 = 6;
const SECONDS_PER_EXTRA_SATELLITE: f64 = 60.0;
const GPS_DEGRADE_PROBABILITY: f64 = 0.05;

const SENSOR_FAILURE_PROBABILITY: f64 = 0.01;
const SENSOR_RECOVERY_PROBABILITY: f64 = 0.05;

const OVERHEAT_TEMP: f64 = 90.0;
const LOW_BATTERY_LEVEL: f64 = 30.0;
const FAULT_REPORT_PROBABILITY: f64 = 0.3;

const RANDOM_ERROR_DESCRIPTIONS: [&str; 4] = [
    "Motor Overheat",
    "Battery Undervoltage",
    "IMU Failure",
    "GPS Lost",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsHealth {
    pub hdop: f64,
    pub pdop: f64,
    pub satellites: u32,
}

/// Satellite count grows with flight time, with occasional short dropouts
pub fn gps_health<R: Rng + ?Sized>(elapsed_s: f64, rng: &mut R) -> GpsHealth {
    let acquired = (elapsed_s.max(0.0) / SECONDS_PER_EXTRA_SATELLITE).floor() as u32;
    let mut satellites = (BASE_SATELLITES + acquired).min(MAX_SATELLITES);

    if rng.random_bool(GPS_DEGRADE_PROBABILITY) {
        let lost = rng.random_range(1..=3);
        satellites = satellites.saturating_sub(lost).max(MIN_SATELLITES);
    }

    let hdop = (2.0 - satellites as f64 / 20.0).max(0.5);
    let pdop = hdop + rng.random_range(0.0..=0.5);

    GpsHealth {
        hdop: round_to(hdop, 2),
        pdop: round_to(pdop, 2),
        satellites,
    }
}

/// Healthy sensors occasionally fail, failed sensors occasionally recover
pub fn update_sensor_health<R: Rng + ?Sized>(sensors: &mut SensorHealth, rng: &mut R) {
    for sensor in Sensor::iter() {
        let next = match sensors.status(sensor) {
            SensorStatus::Healthy if rng.random_bool(SENSOR_FAILURE_PROBABILITY) => {
                SensorStatus::Failed
            }
            SensorStatus::Failed if rng.random_bool(SENSOR_RECOVERY_PROBABILITY) => {
                SensorStatus::Healthy
            }
            status => status,
        };

        sensors.set(sensor, next);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum ErrorSource {
    Motors,
    Battery,
    #[strum(serialize = "Flight Controller")]
    FlightController,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    /// Numeric part of the `E<code>` identifier
    pub code: u16,
    pub description: String,
    pub source: ErrorSource,
}

impl ErrorEvent {
    fn new(code: u16, description: impl Into<String>, source: ErrorSource) -> Self {
        Self {
            code,
            description: description.into(),
            source,
        }
    }

    pub fn code_str(&self) -> String {
        format!("E{}", self.code)
    }
}

/// Picks at most one error for this tick.
///
/// Conditions are checked in priority order. A condition that holds but whose
/// report draw fails lets the next one be tried.
pub fn detect_error<R: Rng + ?Sized>(
    state: &FlightState,
    error_probability: f64,
    rng: &mut R,
) -> Option<ErrorEvent> {
    if state.motor_temps.iter().any(|&t| t > OVERHEAT_TEMP)
        && rng.random_bool(FAULT_REPORT_PROBABILITY)
    {
        return Some(ErrorEvent::new(101, "Motor Overheat", ErrorSource::Motors));
    }

    if state.battery_levels.iter().any(|&l| l < LOW_BATTERY_LEVEL)
        && rng.random_bool(FAULT_REPORT_PROBABILITY)
    {
        return Some(ErrorEvent::new(
            102,
            "Battery Undervoltage",
            ErrorSource::Battery,
        ));
    }

    if let Some(sensor) = state.sensors.first_failed() {
        if rng.random_bool(FAULT_REPORT_PROBABILITY) {
            return Some(ErrorEvent::new(
                103 + sensor as u16,
                format!("{} Failure", sensor.as_ref()),
                ErrorSource::FlightController,
            ));
        }
    }

    if rng.random_bool(error_probability) {
        let code = rng.random_range(101..=199);
        let description = RANDOM_ERROR_DESCRIPTIONS
            .choose(rng)
            .copied()
            .unwrap_or(RANDOM_ERROR_DESCRIPTIONS[0]);
        let sources: Vec<_> = ErrorSource::iter().collect();
        let source = sources
            .choose(rng)
            .copied()
            .unwrap_or(ErrorSource::FlightController);

        return Some(ErrorEvent::new(code, description, source));
    }

    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::sim::{
        drone::state::{DroneParams, NUM_BATTERIES},
        testing::{always, never},
    };

    use super::*;

    fn state() -> FlightState {
        FlightState::new(&DroneParams::default(), &mut always())
    }

    #[test]
    fn test_gps_satellites_grow_with_time() {
        let mut rng = never();

        assert_eq!(gps_health(0.0, &mut rng).satellites, 10);
        assert_eq!(gps_health(59.0, &mut rng).satellites, 10);
        assert_eq!(gps_health(60.0, &mut rng).satellites, 11);
        assert_eq!(gps_health(3600.0, &mut rng).satellites, 20);

        let gps = gps_health(600.0, &mut rng);
        assert_eq!(gps.satellites, 20);
        assert_eq!(gps.hdop, 1.0);
    }

    #[test]
    fn test_gps_bounds() {
        let mut rng = rand::rng();

        for i in 0..2000 {
            let gps = gps_health(i as f64, &mut rng);
            assert!((MIN_SATELLITES..=MAX_SATELLITES).contains(&gps.satellites));
            assert!(gps.hdop >= 0.5);
            assert!(gps.pdop >= gps.hdop && gps.pdop <= gps.hdop + 0.5 + 1e-9);
            assert_eq!(gps.hdop, round_to(gps.hdop, 2));
        }
    }

    #[test]
    fn test_gps_degradation() {
        // Dropout of one satellite, never below the floor
        let gps = gps_health(0.0, &mut always());
        assert_eq!(gps.satellites, 9);
        assert_eq!(gps.hdop, 1.55);
        assert_eq!(gps.pdop, 1.55);
    }

    #[test]
    fn test_sensor_failure_and_recovery() {
        let mut health = SensorHealth::default();

        update_sensor_health(&mut health, &mut always());
        assert!(health.iter().all(|(_, s)| s == SensorStatus::Failed));

        update_sensor_health(&mut health, &mut always());
        assert!(health.iter().all(|(_, s)| s.is_healthy()));

        update_sensor_health(&mut health, &mut never());
        assert!(health.iter().all(|(_, s)| s.is_healthy()));
    }

    #[test]
    fn test_no_error_when_nominal() {
        let s = state();
        assert_eq!(detect_error(&s, 0.02, &mut never()), None);
        assert_eq!(detect_error(&s, 0.0, &mut always()), None);
    }

    #[test]
    fn test_error_priority() {
        let mut s = state();
        s.motor_temps[3] = 91.0;
        s.battery_levels = [10.0; NUM_BATTERIES];
        s.sensors.set(Sensor::Magnetometer, SensorStatus::Failed);

        let err = detect_error(&s, 0.0, &mut always()).unwrap();
        assert_eq!(err, ErrorEvent::new(101, "Motor Overheat", ErrorSource::Motors));
        assert_eq!(err.code_str(), "E101");

        s.motor_temps[3] = 50.0;
        let err = detect_error(&s, 0.0, &mut always()).unwrap();
        assert_eq!(err.code, 102);
        assert_eq!(err.source.as_ref(), "Battery");

        s.battery_levels = [80.0; NUM_BATTERIES];
        let err = detect_error(&s, 0.0, &mut always()).unwrap();
        assert_eq!(
            err,
            ErrorEvent::new(
                105,
                "Magnetometer Failure",
                ErrorSource::FlightController
            )
        );
        assert_eq!(err.source.as_ref(), "Flight Controller");
    }

    #[test]
    fn test_failed_report_draw_is_silent() {
        let mut s = state();
        s.motor_temps[0] = 95.0;

        assert_eq!(detect_error(&s, 0.02, &mut never()), None);
    }

    #[test]
    fn test_random_error_shape() {
        let s = state();
        let mut rng = rand::rng();

        for _ in 0..200 {
            let err = detect_error(&s, 1.0, &mut rng).unwrap();
            assert!((101..=199).contains(&err.code));
            assert!(RANDOM_ERROR_DESCRIPTIONS.contains(&err.description.as_str()));
        }
    }
}
