pub mod dynamics;
pub mod health;
pub mod node;
pub mod sample;
pub mod state;

use rand::Rng;

use self::{
    dynamics::update_flight_dynamics,
    health::{detect_error, gps_health, update_sensor_health},
    sample::DroneSample,
    state::{DroneParams, FlightState},
};

/// Runs one full drone tick and returns the sample to publish
pub fn advance<R: Rng + ?Sized>(
    state: &mut FlightState,
    params: &DroneParams,
    rng: &mut R,
) -> DroneSample {
    update_flight_dynamics(state, params, rng);

    let gps = gps_health(state.elapsed_s, rng);
    update_sensor_health(&mut state.sensors, rng);
    let error = detect_error(state, params.error_probability, rng);

    let sample = DroneSample::new(state, gps, error);
    state.elapsed_s += params.tick_s;

    sample
}
