use std::time::Duration;

use anyhow::Result;

use crate::{
    logging::Record,
    nodes::NodeManager,
    replay::{ReplayFrame, ReplayLog, ReplayPlayer},
    sim::{
        channels,
        drone::{node::DroneSimulator, sample::DroneSample},
        profile::{Profile, ProfilePlayer},
        rig::{node::RigSimulator, sample::RigSample},
    },
};

/// Adds the nodes of a simulation to a node manager
pub trait ModelBuilder {
    /// Type of the samples on `TELEMETRY`
    type Sample: Record + Send + 'static;

    /// Channel carrying the samples that get logged and monitored
    const TELEMETRY: &'static str;

    fn build(&self, node_manager: &mut NodeManager) -> Result<()>;

    /// Print every n-th sample on the console
    fn monitor_every(&self) -> usize {
        1
    }
}

/// The drone telemetry simulator on its own
#[derive(Debug, Clone, Default)]
pub struct DroneModel;

impl ModelBuilder for DroneModel {
    type Sample = DroneSample;
    const TELEMETRY: &'static str = channels::drone::TELEMETRY;

    fn build(&self, nm: &mut NodeManager) -> Result<()> {
        nm.add_node("drone", |ctx| Ok(Box::new(DroneSimulator::new(ctx)?)))
    }
}

/// Motor thrust stand, optionally driven by an RPM profile
#[derive(Debug, Clone, Default)]
pub struct ThrustStandModel {
    pub rpm: Option<f64>,
    pub profile: Option<Profile>,
}

impl ModelBuilder for ThrustStandModel {
    type Sample = RigSample;
    const TELEMETRY: &'static str = channels::rig::TELEMETRY;

    fn build(&self, nm: &mut NodeManager) -> Result<()> {
        // The profile commands the rig in the same step
        if let Some(profile) = &self.profile {
            nm.add_node("profile", |ctx| {
                Ok(Box::new(ProfilePlayer::new(ctx, profile.clone())?))
            })?;
        }

        nm.add_node("rig", |ctx| {
            let rig = RigSimulator::new(ctx)?;

            Ok(Box::new(match self.rpm {
                Some(rpm) => rig.with_rpm(rpm),
                None => rig,
            }))
        })
    }

    fn monitor_every(&self) -> usize {
        10
    }
}

/// Plays back a csv log
#[derive(Debug, Clone)]
pub struct ReplayModel {
    pub log: ReplayLog,
    pub interval: Duration,
}

impl ModelBuilder for ReplayModel {
    type Sample = ReplayFrame;
    const TELEMETRY: &'static str = channels::replay::FRAMES;

    fn build(&self, nm: &mut NodeManager) -> Result<()> {
        nm.add_node("replay", |ctx| {
            Ok(Box::new(ReplayPlayer::new(
                ctx,
                self.log.clone(),
                self.interval,
            )?))
        })
    }
}
