use rand::Rng;
use strum::{AsRefStr, EnumCount, EnumIter, IntoEnumIterator};

use crate::parameters::{Error, ParameterMap};

pub const NUM_MOTORS: usize = 7;
pub const NUM_BATTERIES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumCount)]
pub enum Sensor {
    #[strum(serialize = "IMU")]
    Imu,
    Altimeter,
    Magnetometer,
    PitotTube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorStatus {
    #[default]
    Healthy,
    Failed,
}

impl SensorStatus {
    pub fn is_healthy(self) -> bool {
        self == SensorStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorHealth {
    status: [SensorStatus; Sensor::COUNT],
}

impl SensorHealth {
    pub fn status(&self, sensor: Sensor) -> SensorStatus {
        self.status[sensor as usize]
    }

    pub fn set(&mut self, sensor: Sensor, status: SensorStatus) {
        self.status[sensor as usize] = status;
    }

    /// Sensors in their fixed reporting order
    pub fn iter(&self) -> impl Iterator<Item = (Sensor, SensorStatus)> + '_ {
        Sensor::iter().map(|s| (s, self.status(s)))
    }

    pub fn first_failed(&self) -> Option<Sensor> {
        self.iter()
            .find(|(_, status)| !status.is_healthy())
            .map(|(s, _)| s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroneParams {
    pub tick_s: f64,

    pub origin_latitude: f64,
    pub origin_longitude: f64,
    pub origin_altitude: f64,

    pub max_speed: f64,
    pub acceleration: f64,
    pub position_scale: f64,

    pub ambient_min: f64,
    pub ambient_max: f64,

    pub error_probability: f64,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self {
            tick_s: 1.0,
            origin_latitude: 13.0,
            origin_longitude: 77.6,
            origin_altitude: 150.0,
            max_speed: 15.0,
            acceleration: 0.2,
            position_scale: 1e-5,
            ambient_min: 25.0,
            ambient_max: 30.0,
            error_probability: 0.02,
        }
    }
}

impl DroneParams {
    /// Reads the `drone` parameter subtree. Missing entries keep their default.
    pub fn from_params(map: &ParameterMap) -> Result<Self, Error> {
        let d = Self::default();

        let params = Self {
            tick_s: map.float_or("tick", d.tick_s)?,
            origin_latitude: map.float_or("origin.latitude", d.origin_latitude)?,
            origin_longitude: map.float_or("origin.longitude", d.origin_longitude)?,
            origin_altitude: map.float_or("origin.altitude", d.origin_altitude)?,
            max_speed: map.float_or("max_speed", d.max_speed)?,
            acceleration: map.float_or("acceleration", d.acceleration)?,
            position_scale: map.float_or("position_scale", d.position_scale)?,
            ambient_min: map.float_or("ambient.min", d.ambient_min)?,
            ambient_max: map.float_or("ambient.max", d.ambient_max)?,
            error_probability: map.float_or("error_probability", d.error_probability)?,
        };

        params.validate(map.path())?;

        Ok(params)
    }

    fn validate(&self, root: &str) -> Result<(), Error> {
        let out_of_range = |name: &str, reason: &str| Error::OutOfRange {
            path: format!("{root}.{name}"),
            reason: reason.to_string(),
        };

        if !(self.tick_s > 0.0) {
            return Err(out_of_range("tick", "must be positive"));
        }
        if !(self.max_speed >= 0.0) || !(self.acceleration >= 0.0) {
            return Err(out_of_range("max_speed", "speeds must not be negative"));
        }
        if !(self.ambient_min <= self.ambient_max) {
            return Err(out_of_range("ambient", "min is larger than max"));
        }
        if !(0.0..=1.0).contains(&self.error_probability) {
            return Err(out_of_range("error_probability", "not a probability"));
        }

        Ok(())
    }

    /// A fresh ambient temperature draw
    pub fn ambient<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.random_range(self.ambient_min..=self.ambient_max)
    }
}

/// Complete state of the simulated aircraft
#[derive(Debug, Clone, PartialEq)]
pub struct FlightState {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,

    /// Degrees in [0, 360)
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,

    pub speed: f64,
    pub armed: bool,

    pub motor_rpms: [i32; NUM_MOTORS],
    pub motor_temps: [f64; NUM_MOTORS],

    /// Percent
    pub battery_levels: [f64; NUM_BATTERIES],
    pub battery_temps: [f64; NUM_BATTERIES],

    pub sensors: SensorHealth,

    pub elapsed_s: f64,
}

impl FlightState {
    pub fn new<R: Rng + ?Sized>(params: &DroneParams, rng: &mut R) -> Self {
        let heading = rng.random_range(0.0..360.0);

        Self {
            latitude: params.origin_latitude,
            longitude: params.origin_longitude,
            altitude: params.origin_altitude,
            heading,
            roll: 0.0,
            pitch: 0.0,
            yaw: heading,
            speed: 0.0,
            armed: false,
            motor_rpms: [0; NUM_MOTORS],
            motor_temps: std::array::from_fn(|_| params.ambient(rng)),
            battery_levels: [100.0; NUM_BATTERIES],
            battery_temps: std::array::from_fn(|_| params.ambient(rng)),
            sensors: SensorHealth::default(),
            elapsed_s: 0.0,
        }
    }
}
