use anyhow::{Context, Result};
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
    sample::RigSample,
    state::{MotorRigState, RigNoise, RigParams},
};

pub struct RigSimulator {
    params: RigParams,
    state: MotorRigState,
    noise: RigNoise,
    rng: Xoshiro256StarStar,

    steps_per_tick: usize,
    step_count: usize,

    rx_command: TelemetryReceiver<Command>,
    tx_sample: TelemetrySender<RigSample>,
}

impl RigSimulator {
    pub fn new(ctx: NodeContext) -> Result<Self> {
        let rig_params = ctx.parameters().get_map_or_empty("rig")?;
        let params = RigParams::from_params(&rig_params)?;

        let mut state = MotorRigState::new(&params);
        state.set_rpm(rig_params.float_or("initial_rpm", 0.0)?, &params);
        if rig_params.bool_or("autostart", true)? {
            state.start();
        }

        info!(
            "Rig simulator: tick {:.3} s, max {} RPM",
            params.tick_s, params.max_rpm
        );

        Ok(Self {
            steps_per_tick: ctx.steps_per_period(params.tick_s)?,
            step_count: 0,
            noise: RigNoise::new().context("Invalid rig noise distribution")?,
            rng: ctx.get_rng_256(),
            params,
            state,
            rx_command: ctx
                .telemetry()
                .subscribe(channels::rig::COMMAND, Capacity::Unbounded)?,
            tx_sample: ctx.telemetry().publish(channels::rig::TELEMETRY)?,
        })
    }

    pub fn with_rpm(mut self, rpm: f64) -> Self {
        self.state.set_rpm(rpm, &self.params);
        self
    }

    pub fn state(&self) -> &MotorRigState {
        &self.state
    }

    /// Applies queued commands. Returns false on shutdown.
    fn handle_commands(&mut self) -> bool {
        for cmd in pending_commands(&self.rx_command) {
            match cmd {
                Command::Start => {
                    if !self.state.is_running() {
                        debug!("Rig started");
                        self.state.start();
                        self.step_count = 0;
                    }
                }
                Command::Stop => {
                    debug!("Rig stopped");
                    self.state.stop(&self.params);
                }
                Command::SetRpm(rpm) => self.state.set_rpm(rpm, &self.params),
                Command::Shutdown => return false,
                Command::Step => debug!("Rig ignored command {cmd:?}"),
            }
        }

        true
    }
}

impl Node for RigSimulator {
    fn step(&mut self, _: usize, _: TimeDelta, clock: &dyn Clock) -> Result<StepResult> {
        if !self.handle_commands() {
            return Ok(StepResult::Stop);
        }

        if !self.state.is_running() {
            return Ok(StepResult::Continue);
        }

        if self.step_count % self.steps_per_tick == 0 {
            let sample = self.state.update(&self.params, &self.noise, &mut self.rng);
            self.tx_sample.send(Timestamp::now(clock), sample);
        }
        self.step_count += 1;

        Ok(StepResult::Continue)
    }
}
