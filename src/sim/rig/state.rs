use rand::Rng;
use rand_distr::{Distribution, Uniform, uniform};

use crate::{
    parameters::{Error, ParameterMap},
    sim::round_to,
};

use super::sample::RigSample;

const MIN_FLUCTUATION_RPM: i64 = 10;
const FLUCTUATION_RATIO: f64 = 0.02;

const IDLE_CURRENT: f64 = 0.5;
const CURRENT_SPAN: f64 = 15.0;
const CURRENT_NOISE: f64 = 0.2;

const TORQUE_PER_AMP: f64 = 0.3;
const TORQUE_NOISE: f64 = 0.05;

const VOLTAGE_NOISE: f64 = 0.1;

const COOLING_RATE: f64 = 0.1;
const TEMP_NOISE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct RigParams {
    pub tick_s: f64,
    pub max_rpm: f64,
    pub nominal_voltage: f64,
    pub min_voltage: f64,
    /// Volts lost per RPM of load
    pub voltage_sag: f64,
    pub ambient_temp: f64,
    pub max_temp: f64,
    /// Degrees per amp per tick
    pub heating: f64,
}

impl Default for RigParams {
    fn default() -> Self {
        Self {
            tick_s: 0.1,
            max_rpm: 12000.0,
            nominal_voltage: 24.0,
            min_voltage: 18.0,
            voltage_sag: 0.0002,
            ambient_temp: 25.0,
            max_temp: 85.0,
            heating: 0.001,
        }
    }
}

impl RigParams {
    /// Reads the `rig` parameter subtree. Missing entries keep their default.
    pub fn from_params(map: &ParameterMap) -> Result<Self, Error> {
        let d = Self::default();

        let params = Self {
            tick_s: map.float_or("tick", d.tick_s)?,
            max_rpm: map.float_or("max_rpm", d.max_rpm)?,
            nominal_voltage: map.float_or("battery.nominal_voltage", d.nominal_voltage)?,
            min_voltage: map.float_or("battery.min_voltage", d.min_voltage)?,
            voltage_sag: map.float_or("battery.sag_per_rpm", d.voltage_sag)?,
            ambient_temp: map.float_or("thermal.ambient", d.ambient_temp)?,
            max_temp: map.float_or("thermal.max", d.max_temp)?,
            heating: map.float_or("thermal.heating_per_amp", d.heating)?,
        };

        let fail = |name: &str, reason: &str| Error::OutOfRange {
            path: format!("{}.{name}", map.path()),
            reason: reason.to_string(),
        };

        if !(params.tick_s > 0.0) {
            return Err(fail("tick", "must be positive"));
        }
        if !(params.max_rpm > 0.0) {
            return Err(fail("max_rpm", "must be positive"));
        }
        if !(params.min_voltage <= params.nominal_voltage) {
            return Err(fail("battery", "min voltage above nominal"));
        }
        if !(params.ambient_temp <= params.max_temp) {
            return Err(fail("thermal", "ambient above max temperature"));
        }
        if !(params.voltage_sag >= 0.0) || !params.voltage_sag.is_finite() {
            return Err(fail("battery.sag_per_rpm", "must be finite and not negative"));
        }
        if !(params.heating >= 0.0) || !params.heating.is_finite() {
            return Err(fail("thermal.heating_per_amp", "must be finite and not negative"));
        }

        Ok(params)
    }
}

/// Noise sources applied to every reading
#[derive(Debug, Clone)]
pub struct RigNoise {
    current: Uniform<f64>,
    torque: Uniform<f64>,
    voltage: Uniform<f64>,
    temp: Uniform<f64>,
}

impl RigNoise {
    pub fn new() -> Result<Self, uniform::Error> {
        Ok(Self {
            current: Uniform::new_inclusive(-CURRENT_NOISE, CURRENT_NOISE)?,
            torque: Uniform::new_inclusive(-TORQUE_NOISE, TORQUE_NOISE)?,
            voltage: Uniform::new_inclusive(-VOLTAGE_NOISE, VOLTAGE_NOISE)?,
            temp: Uniform::new_inclusive(-TEMP_NOISE, TEMP_NOISE)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotorRigState {
    commanded_rpm: f64,
    pub voltage: f64,
    pub temperature: f64,
    running: bool,
}

impl MotorRigState {
    pub fn new(params: &RigParams) -> Self {
        Self {
            commanded_rpm: 0.0,
            voltage: params.nominal_voltage,
            temperature: params.ambient_temp,
            running: false,
        }
    }

    /// Values outside [0, max_rpm] are clamped
    pub fn set_rpm(&mut self, rpm: f64, params: &RigParams) {
        self.commanded_rpm = if rpm.is_nan() {
            0.0
        } else {
            rpm.clamp(0.0, params.max_rpm)
        };
    }

    pub fn commanded_rpm(&self) -> f64 {
        self.commanded_rpm
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops the motor and puts the battery and thermal state back to rest
    pub fn stop(&mut self, params: &RigParams) {
        self.running = false;
        self.voltage = params.nominal_voltage;
        self.temperature = params.ambient_temp;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_spinning(&self) -> bool {
        self.running && self.commanded_rpm > 0.0
    }

    /// Advances the rig by one tick and returns the rounded readings
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        params: &RigParams,
        noise: &RigNoise,
        rng: &mut R,
    ) -> RigSample {
        let commanded = self.commanded_rpm as i64;
        let fluctuation = MIN_FLUCTUATION_RPM.max((FLUCTUATION_RATIO * self.commanded_rpm) as i64);
        let rpm = (commanded + rng.random_range(-fluctuation..=fluctuation)).max(0);

        let load = rpm as f64 / params.max_rpm;
        let current = IDLE_CURRENT + load * load * CURRENT_SPAN + noise.current.sample(rng);
        let torque = current * TORQUE_PER_AMP * (1.0 + noise.torque.sample(rng));

        self.voltage = params
            .min_voltage
            .max(params.nominal_voltage - rpm as f64 * params.voltage_sag);
        let voltage = self.voltage + noise.voltage.sample(rng);

        self.temperature = if self.is_spinning() {
            params.max_temp.min(self.temperature + current * params.heating)
        } else {
            params.ambient_temp.max(self.temperature - COOLING_RATE)
        };
        let temp = self.temperature + noise.temp.sample(rng);

        let current = round_to(current, 2);
        let voltage = round_to(voltage, 2);

        RigSample {
            rpm,
            current,
            torque: round_to(torque, 2),
            temp: round_to(temp, 1),
            voltage,
            power: round_to(voltage * current, 2),
        }
    }
}
