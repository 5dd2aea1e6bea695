use std::time::Duration;

use anyhow::Result;
use chrono::TimeDelta;
use log::{debug, info, warn};

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

use super::{ReplayFrame, ReplayLog};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Frame interval for a playback speed between 1 (slow) and 100 (fast)
pub fn interval_for_speed(speed: u32) -> Duration {
    Duration::from_millis(1000 / u64::from(speed.clamp(1, 100)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    Complete,
}

/// Position and play state within a loaded log
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    log: ReplayLog,
    position: usize,
    state: PlaybackState,
}

impl ReplayCursor {
    pub fn new(log: ReplayLog) -> Self {
        let state = if log.is_empty() {
            PlaybackState::Complete
        } else {
            PlaybackState::Paused
        };

        Self {
            log,
            position: 0,
            state,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn play(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Pauses and yields the next frame
    pub fn step_once(&mut self) -> Option<ReplayFrame> {
        self.pause();
        self.advance()
    }

    /// Next frame while playing
    pub fn next_frame(&mut self) -> Option<ReplayFrame> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.advance()
    }

    fn advance(&mut self) -> Option<ReplayFrame> {
        let frame = self.log.frame(self.position);

        match frame {
            Some(_) => self.position += 1,
            None => self.state = PlaybackState::Complete,
        }
        if self.position == self.log.len() {
            self.state = PlaybackState::Complete;
        }

        frame
    }

    /// "i / n frames"
    pub fn progress(&self) -> String {
        format!("{} / {} frames", self.position, self.log.len())
    }
}

/// Republishes a csv log on the bus at a fixed frame interval
pub struct ReplayPlayer {
    cursor: ReplayCursor,
    steps_per_frame: usize,
    step_count: usize,

    rx_command: TelemetryReceiver<Command>,
    tx_frame: TelemetrySender<ReplayFrame>,
}

impl ReplayPlayer {
    pub fn new(ctx: NodeContext, log: ReplayLog, interval: Duration) -> Result<Self> {
        let replay_params = ctx.parameters().get_map_or_empty("replay")?;
        let dt = ctx.parameters().float_or("sim.dt", 0.01)?;

        let frame_s = interval.as_secs_f64();
        let steps_per_frame = ((frame_s / dt).round() as usize).max(1);
        if ((steps_per_frame as f64) * dt - frame_s).abs() > 1e-9 {
            warn!(
                "Frame interval {frame_s:.3} s is not a multiple of the base step, using {:.3} s",
                steps_per_frame as f64 * dt
            );
        }

        let mut cursor = ReplayCursor::new(log);
        if replay_params.bool_or("autoplay", true)? {
            cursor.play();
        }

        info!(
            "Replay: {} frames every {:.3} s",
            cursor.log.len(),
            steps_per_frame as f64 * dt
        );

        Ok(Self {
            cursor,
            steps_per_frame,
            step_count: 0,
            rx_command: ctx
                .telemetry()
                .subscribe(channels::replay::COMMAND, Capacity::Unbounded)?,
            tx_frame: ctx.telemetry().publish(channels::replay::FRAMES)?,
        })
    }

    pub fn cursor(&self) -> &ReplayCursor {
        &self.cursor
    }

    fn send(&self, frame: ReplayFrame, clock: &dyn Clock) {
        debug!("Replay {}", self.cursor.progress());
        self.tx_frame.send(Timestamp::now(clock), frame);
    }
}

impl Node for ReplayPlayer {
    fn step(&mut self, _: usize, _: TimeDelta, clock: &dyn Clock) -> Result<StepResult> {
        for cmd in pending_commands(&self.rx_command) {
            match cmd {
                Command::Start => {
                    self.cursor.play();
                    self.step_count = 0;
                }
                Command::Stop => self.cursor.pause(),
                Command::Step => {
                    if let Some(frame) = self.cursor.step_once() {
                        self.send(frame, clock);
                    }
                }
                Command::Shutdown => return Ok(StepResult::Stop),
                Command::SetRpm(_) => debug!("Replay ignored command {cmd:?}"),
            }
        }

        if self.cursor.state() == PlaybackState::Playing
            && self.step_count % self.steps_per_frame == 0
        {
            if let Some(frame) = self.cursor.next_frame() {
                self.send(frame, clock);
            }
        }
        self.step_count += 1;

        if self.cursor.state() == PlaybackState::Complete {
            info!(
                "Replay complete, {} at {:.1} s",
                self.cursor.progress(),
                clock.monotonic().elapsed_seconds_f64()
            );
            return Ok(StepResult::Stop);
        }

        Ok(StepResult::Continue)
    }
}
