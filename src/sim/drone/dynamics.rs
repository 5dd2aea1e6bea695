use rand::Rng;

use super::state::{DroneParams, FlightState};

const TURN_PROBABILITY: f64 = 0.1;
const MAX_TURN_DEG: f64 = 5.0;
const ROLL_PER_TURN_DEG: f64 = 2.0;
const ATTITUDE_DECAY: f64 = 0.9;

const ARM_PROBABILITY: f64 = 0.05;
const ACCELERATE_PROBABILITY: f64 = 0.7;
const DECELERATE_PROBABILITY: f64 = 0.1;

const CLIMB_PROBABILITY: f64 = 0.1;
const MAX_CLIMB_M: f64 = 2.0;
const PITCH_PER_METER: f64 = 0.1;
const REFERENCE_ALTITUDE_M: f64 = 150.0;

const IDLE_RPM: f64 = 3000.0;
const RPM_PER_FULL_SPEED: f64 = 5000.0;
const RPM_NOISE: f64 = 200.0;
const NOMINAL_RPM: f64 = 8000.0;

const MOTOR_HEATING: f64 = 0.5;
const MOTOR_COOLING: f64 = 0.1;
const MOTOR_MAX_TEMP: f64 = 95.0;

const BATTERY_DRAIN: f64 = 0.02;
const BATTERY_HEATING: f64 = 0.05;
const BATTERY_COOLING: f64 = 0.1;
const BATTERY_MAX_TEMP: f64 = 75.0;

/// Advances attitude, speed, position, motors and batteries by one tick
pub fn update_flight_dynamics<R: Rng + ?Sized>(
    state: &mut FlightState,
    params: &DroneParams,
    rng: &mut R,
) {
    update_heading(state, rng);
    update_speed(state, params, rng);
    update_position(state, params);
    update_altitude(state, rng);
    update_motors(state, params, rng);
    update_batteries(state, params, rng);
}

fn update_heading<R: Rng + ?Sized>(state: &mut FlightState, rng: &mut R) {
    if rng.random_bool(TURN_PROBABILITY) {
        let turn = rng.random_range(-MAX_TURN_DEG..=MAX_TURN_DEG);

        state.heading = wrap_degrees(state.heading + turn);
        state.roll = turn * ROLL_PER_TURN_DEG;
    } else {
        state.roll *= ATTITUDE_DECAY;
    }

    state.yaw = state.heading;
}

/// Maps any angle to [0, 360)
fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);

    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

fn update_speed<R: Rng + ?Sized>(state: &mut FlightState, params: &DroneParams, rng: &mut R) {
    if !state.armed && rng.random_bool(ARM_PROBABILITY) {
        state.armed = true;
    }

    if state.armed {
        if state.speed < params.max_speed && rng.random_bool(ACCELERATE_PROBABILITY) {
            state.speed = (state.speed + params.acceleration).min(params.max_speed);
        } else if rng.random_bool(DECELERATE_PROBABILITY) {
            state.speed = (state.speed - params.acceleration).max(0.0);
        }
    } else {
        state.speed = (state.speed - params.acceleration).max(0.0);
    }
}

fn update_position(state: &mut FlightState, params: &DroneParams) {
    let heading = state.heading.to_radians();

    state.latitude += state.speed * heading.cos() * params.position_scale;
    state.longitude += state.speed * heading.sin() * params.position_scale;
}

fn update_altitude<R: Rng + ?Sized>(state: &mut FlightState, rng: &mut R) {
    if rng.random_bool(CLIMB_PROBABILITY) {
        state.altitude += rng.random_range(-MAX_CLIMB_M..=MAX_CLIMB_M);
        state.pitch = (state.altitude - REFERENCE_ALTITUDE_M) * PITCH_PER_METER;
    } else {
        state.pitch *= ATTITUDE_DECAY;
    }
}

fn update_motors<R: Rng + ?Sized>(state: &mut FlightState, params: &DroneParams, rng: &mut R) {
    let base_rpm = if params.max_speed > 0.0 {
        IDLE_RPM + state.speed / params.max_speed * RPM_PER_FULL_SPEED
    } else {
        IDLE_RPM
    };

    for (rpm, temp) in state.motor_rpms.iter_mut().zip(state.motor_temps.iter_mut()) {
        *rpm = (base_rpm + rng.random_range(-RPM_NOISE..=RPM_NOISE)) as i32;

        let heated = *temp + *rpm as f64 / NOMINAL_RPM * MOTOR_HEATING - MOTOR_COOLING;
        let ambient = params.ambient(rng);

        *temp = heated.max(ambient).min(MOTOR_MAX_TEMP);
    }
}

fn update_batteries<R: Rng + ?Sized>(state: &mut FlightState, params: &DroneParams, rng: &mut R) {
    if state.armed {
        let mean_rpm = state.motor_rpms.iter().map(|&r| r as f64).sum::<f64>()
            / state.motor_rpms.len() as f64;
        let drain = BATTERY_DRAIN * mean_rpm / NOMINAL_RPM;

        for (level, temp) in state
            .battery_levels
            .iter_mut()
            .zip(state.battery_temps.iter_mut())
        {
            *level = (*level - drain).max(0.0);
            *temp = (*temp + BATTERY_HEATING * drain).min(BATTERY_MAX_TEMP);
        }
    } else {
        for temp in state.battery_temps.iter_mut() {
            *temp = (*temp - BATTERY_COOLING).max(params.ambient(rng));
        }
    }
}
