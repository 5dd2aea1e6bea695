//! Commanded-RPM profiles for the thrust stand.
//!
//! A profile is a finite stream of RPM set points sampled at
//! [`PROFILE_RATE_HZ`]. [`ProfilePlayer`] forwards it to the rig one sample per
//! period.

use std::{f64::consts::PI, fs, path::Path};

use anyhow::Result;
use chrono::TimeDelta;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    core::time::{Clock, Timestamp},
    nodes::{Node, NodeContext, StepResult},
    sim::{channels, control::Command},
    telemetry::{TelemetryDispatcher, TelemetrySender},
};

pub const PROFILE_RATE_HZ: f64 = 100.0;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Cannot read profile file")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse profile")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid profile field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStep {
    pub rpm: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Profile {
    Sine {
        amplitude: f64,
        frequency: f64,
        offset: f64,
        duration: f64,
    },
    Step {
        steps: Vec<ProfileStep>,
        /// If longer than the steps, the last step is held until then
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    Ramp {
        start_rpm: f64,
        end_rpm: f64,
        ramp_time: f64,
        duration: f64,
    },
    Chirp {
        start_freq: f64,
        end_freq: f64,
        amplitude: f64,
        duration: f64,
    },
}

/// Number of samples covering `duration` seconds
fn sample_count(duration: f64) -> usize {
    (duration * PROFILE_RATE_HZ) as usize
}

/// Time of sample `i` when `n` samples are spread over [0, duration], both ends included
fn spaced_time(i: usize, n: usize, duration: f64) -> f64 {
    if n > 1 {
        duration * i as f64 / (n - 1) as f64
    } else {
        0.0
    }
}

impl Profile {
    pub fn from_toml(s: &str) -> Result<Self, ProfileError> {
        let profile: Profile = toml::from_str(s)?;
        profile.validate()?;

        Ok(profile)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        fn finite(field: &'static str, v: f64) -> Result<(), ProfileError> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(ProfileError::Invalid {
                    field,
                    reason: format!("{v} is not a finite number"),
                })
            }
        }

        fn non_negative(field: &'static str, v: f64) -> Result<(), ProfileError> {
            finite(field, v)?;
            if v < 0.0 {
                return Err(ProfileError::Invalid {
                    field,
                    reason: format!("{v} is negative"),
                });
            }
            Ok(())
        }

        match self {
            Profile::Sine {
                amplitude,
                frequency,
                offset,
                duration,
            } => {
                finite("amplitude", *amplitude)?;
                finite("offset", *offset)?;
                non_negative("frequency", *frequency)?;
                non_negative("duration", *duration)?;
            }
            Profile::Step { steps, duration } => {
                if steps.is_empty() {
                    return Err(ProfileError::Invalid {
                        field: "steps",
                        reason: "at least one step is required".to_string(),
                    });
                }
                for step in steps {
                    finite("steps.rpm", step.rpm)?;
                    non_negative("steps.duration", step.duration)?;
                }
                if let Some(d) = duration {
                    non_negative("duration", *d)?;
                }
            }
            Profile::Ramp {
                start_rpm,
                end_rpm,
                ramp_time,
                duration,
            } => {
                finite("start_rpm", *start_rpm)?;
                finite("end_rpm", *end_rpm)?;
                non_negative("ramp_time", *ramp_time)?;
                non_negative("duration", *duration)?;
            }
            Profile::Chirp {
                start_freq,
                end_freq,
                amplitude,
                duration,
            } => {
                non_negative("start_freq", *start_freq)?;
                non_negative("end_freq", *end_freq)?;
                finite("amplitude", *amplitude)?;
                non_negative("duration", *duration)?;
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            Profile::Sine { duration, .. }
            | Profile::Ramp { duration, .. }
            | Profile::Chirp { duration, .. } => sample_count(*duration),
            Profile::Step { steps, duration } => {
                let stepped: usize = steps.iter().map(|s| sample_count(s.duration)).sum();
                stepped.max(duration.map_or(0, sample_count))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set point of sample `i`, or `None` past the end
    pub fn value_at(&self, i: usize) -> Option<f64> {
        let n = self.len();
        if i >= n {
            return None;
        }

        let value = match self {
            Profile::Sine {
                amplitude,
                frequency,
                offset,
                duration,
            } => {
                let t = spaced_time(i, n, *duration);
                offset + amplitude * (2.0 * PI * frequency * t).sin()
            }
            Profile::Step { steps, .. } => {
                let mut remaining = i;
                let mut value = None;
                for step in steps {
                    let count = sample_count(step.duration);
                    if remaining < count {
                        value = Some(step.rpm);
                        break;
                    }
                    remaining -= count;
                }

                // Past the last step: hold it
                value.or_else(|| steps.last().map(|s| s.rpm))?
            }
            Profile::Ramp {
                start_rpm,
                end_rpm,
                ramp_time,
                ..
            } => {
                let t = i as f64 / PROFILE_RATE_HZ;
                let progress = if *ramp_time > 0.0 {
                    (t / ramp_time).min(1.0)
                } else {
                    1.0
                };
                start_rpm + (end_rpm - start_rpm) * progress
            }
            Profile::Chirp {
                start_freq,
                end_freq,
                amplitude,
                duration,
            } => {
                let t = spaced_time(i, n, *duration);
                let phase =
                    2.0 * PI * (start_freq * t + (end_freq - start_freq) * t * t / (2.0 * duration));
                amplitude * phase.sin()
            }
        };

        Some(value)
    }

    pub fn samples(&self) -> ProfileSamples<'_> {
        ProfileSamples {
            profile: self,
            index: 0,
        }
    }
}

pub struct ProfileSamples<'a> {
    profile: &'a Profile,
    index: usize,
}

impl Iterator for ProfileSamples<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let v = self.profile.value_at(self.index)?;
        self.index += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.profile.len().saturating_sub(self.index);
        (left, Some(left))
    }
}

/// Sends a profile to the rig as `SetRpm` commands, one per sample period
pub struct ProfilePlayer {
    profile: Profile,
    index: usize,
    steps_per_sample: usize,
    step_count: usize,
    stop_at_end: bool,
    finished: bool,

    tx_command: TelemetrySender<Command>,
}

impl ProfilePlayer {
    pub fn new(ctx: NodeContext, profile: Profile) -> Result<Self> {
        profile.validate()?;

        let stop_at_end = ctx
            .parameters()
            .get_map_or_empty("profile")?
            .bool_or("stop_at_end", true)?;

        info!(
            "Profile player: {} samples ({:.2} s)",
            profile.len(),
            profile.len() as f64 / PROFILE_RATE_HZ
        );

        Ok(Self {
            steps_per_sample: ctx.steps_per_period(1.0 / PROFILE_RATE_HZ)?,
            step_count: 0,
            index: 0,
            stop_at_end,
            finished: false,
            tx_command: ctx.telemetry().publish(channels::rig::COMMAND)?,
            profile,
        })
    }

    /// Samples sent so far and total
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.profile.len())
    }
}

impl Node for ProfilePlayer {
    fn step(&mut self, _: usize, _: TimeDelta, clock: &dyn Clock) -> Result<StepResult> {
        if self.finished {
            return Ok(StepResult::Continue);
        }

        if self.step_count % self.steps_per_sample == 0 {
            match self.profile.value_at(self.index) {
                Some(rpm) => {
                    self.tx_command
                        .send(Timestamp::now(clock), Command::SetRpm(rpm));
                    self.index += 1;
                }
                None => {
                    info!("Profile complete ({} samples)", self.index);
                    self.finished = true;

                    if self.stop_at_end {
                        return Ok(StepResult::Stop);
                    }
                }
            }
        }
        self.step_count += 1;

        Ok(StepResult::Continue)
    }
}
