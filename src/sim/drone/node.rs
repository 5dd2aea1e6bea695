use anyhow::Result;
use chrono::TimeDelta;
use log::{debug, info};
use rand_xoshiro::Xoshiro256StarStar;

use crate::{
    core::time::{Clock, Timestamp},
    nodes::{Node, NodeContext, StepResult},
    sim::{
        channels,
        control::{Command, pending_commands},
    },
    telemetry::{TelemetryDispatcher, TelemetryReceiver, TelemetrySender},
    utils::capacity::Capacity,
};

use super::{
    advance,
    sample::DroneSample,
    state::{DroneParams, FlightState},
};

pub struct DroneSimulator {
    params: DroneParams,
    state: FlightState,
    rng: Xoshiro256StarStar,

    steps_per_tick: usize,
    step_count: usize,
    running: bool,

    rx_command: TelemetryReceiver<Command>,
    tx_sample: TelemetrySender<DroneSample>,
}

impl DroneSimulator {
    pub fn new(ctx: NodeContext) -> Result<Self> {
        let drone_params = ctx.parameters().get_map_or_empty("drone")?;
        let params = DroneParams::from_params(&drone_params)?;

        let steps_per_tick = ctx.steps_per_period(params.tick_s)?;
        let running = drone_params.bool_or("autostart", true)?;

        let mut rng: Xoshiro256StarStar = ctx.get_rng_256();
        let state = FlightState::new(&params, &mut rng);

        info!(
            "Drone simulator: tick {:.3} s, origin ({:.4}, {:.4})",
            params.tick_s, params.origin_latitude, params.origin_longitude
        );

        Ok(Self {
            params,
            state,
            rng,
            steps_per_tick,
            step_count: 0,
            running,
            rx_command: ctx
                .telemetry()
                .subscribe(channels::drone::COMMAND, Capacity::Unbounded)?,
            tx_sample: ctx.telemetry().publish(channels::drone::TELEMETRY)?,
        })
    }

    pub fn state(&self) -> &FlightState {
        &self.state
    }

    /// Applies queued commands. Returns false on shutdown.
    fn handle_commands(&mut self) -> bool {
        for cmd in pending_commands(&self.rx_command) {
            match cmd {
                Command::Start => {
                    if !self.running {
                        debug!("Drone simulator started");
                        self.running = true;
                        self.step_count = 0;
                    }
                }
                Command::Stop => {
                    debug!("Drone simulator stopped");
                    self.running = false;
                }
                Command::Shutdown => return false,
                Command::SetRpm(_) | Command::Step => {
                    debug!("Drone simulator ignored command {cmd:?}");
                }
            }
        }

        true
    }
}

impl Node for DroneSimulator {
    fn step(&mut self, _: usize, _: TimeDelta, clock: &dyn Clock) -> Result<StepResult> {
        if !self.handle_commands() {
            return Ok(StepResult::Stop);
        }

        if !self.running {
            return Ok(StepResult::Continue);
        }

        if self.step_count % self.steps_per_tick == 0 {
            let sample = advance(&mut self.state, &self.params, &mut self.rng);
            self.tx_sample.send(Timestamp::now(clock), sample);
        }
        self.step_count += 1;

        Ok(StepResult::Continue)
    }
}
