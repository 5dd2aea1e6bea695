use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use log::debug;
use rand_xoshiro::{
    SplitMix64,
    rand_core::{RngCore, SeedableRng},
};

use crate::{
    core::time::Clock,
    parameters::ParameterMap,
    telemetry::TelemetryService,
};

pub enum StepResult {
    Continue,
    Stop,
}

pub trait Node {
    fn step(&mut self, i: usize, dt: TimeDelta, clock: &dyn Clock) -> Result<StepResult>;
}

pub type BoxedNode = Box<dyn Node + Send>;

pub struct NodeManager {
    telemetry: TelemetryService,
    parameters: Arc<ParameterMap>,
    nodes: Vec<(String, BoxedNode)>,
    rng: Arc<Mutex<SplitMix64>>,
    seed: u64,
}

impl NodeManager {
    pub fn new(telemetry: TelemetryService, parameters: ParameterMap) -> Self {
        Self::new_from_seed(telemetry, parameters, rand::random())
    }

    pub fn new_from_seed(telemetry: TelemetryService, parameters: ParameterMap, seed: u64) -> Self {
        NodeManager {
            telemetry,
            parameters: Arc::new(parameters),
            nodes: vec![],
            rng: Arc::new(Mutex::new(SplitMix64::seed_from_u64(seed))),
            seed,
        }
    }

    /// Nodes are stepped in the order they are added
    pub fn add_node<F>(&mut self, name: &str, creator: F) -> Result<()>
    where
        F: FnOnce(NodeContext) -> Result<BoxedNode>,
    {
        let context = NodeContext {
            telemetry: self.telemetry.clone(),
            parameters: self.parameters.clone(),
            rng: self.rng.clone(),
        };

        let node = creator(context).with_context(|| format!("Error creating node '{name}'"))?;
        debug!("Added node '{name}'");

        self.nodes.push((name.to_string(), node));

        Ok(())
    }

    pub fn nodes(&self) -> &[(String, BoxedNode)] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [(String, BoxedNode)] {
        &mut self.nodes
    }

    pub fn parameters(&self) -> Arc<ParameterMap> {
        self.parameters.clone()
    }

    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

pub struct NodeContext {
    telemetry: TelemetryService,
    parameters: Arc<ParameterMap>,
    rng: Arc<Mutex<SplitMix64>>,
}

impl NodeContext {
    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Each call returns a generator with a fresh seed drawn from the
    /// manager's master generator, so a run is reproducible from its seed.
    pub fn get_rng_256<R>(&self) -> R
    where
        R: SeedableRng<Seed = [u8; 32]>,
    {
        let mut seed: [u8; 32] = [0; 32];

        self.rng.lock().unwrap().fill_bytes(&mut seed);

        R::from_seed(seed)
    }

    /// Number of executor steps in one period of `period_s` seconds
    pub fn steps_per_period(&self, period_s: f64) -> Result<usize> {
        let sim_dt = self.parameters.get_param("sim.dt")?.value_float()?;

        steps_per_period(sim_dt, period_s)
    }
}

/// `period_s` must be an integer multiple of `sim_dt`
pub fn steps_per_period(sim_dt: f64, period_s: f64) -> Result<usize> {
    if !(sim_dt > 0.0) || !(period_s > 0.0) {
        bail!("Periods must be positive (sim dt: {sim_dt}, period: {period_s})");
    }

    let ratio = period_s / sim_dt;
    if (ratio - ratio.round()).abs() > 1e-8 || ratio.round() < 1.0 {
        bail!("Simulation time step ({sim_dt}) is not a divisor of the period ({period_s})");
    }

    Ok(ratio.round() as usize)
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rand_xoshiro::Xoshiro256StarStar;

    use crate::parameters;

    use super::*;

    fn manager(seed: u64) -> NodeManager {
        let params = parameters::parse_string("[sim]\ndt = { type = \"float\", val = 0.01 }")
            .unwrap();
        NodeManager::new_from_seed(TelemetryService::default(), params, seed)
    }

    struct Noop;

    impl Node for Noop {
        fn step(&mut self, _: usize, _: TimeDelta, _: &dyn Clock) -> Result<StepResult> {
            Ok(StepResult::Continue)
        }
    }

    #[test]
    fn test_steps_per_period() {
        assert_eq!(steps_per_period(0.01, 1.0).unwrap(), 100);
        assert_eq!(steps_per_period(0.01, 0.1).unwrap(), 10);
        assert_eq!(steps_per_period(0.1, 0.1).unwrap(), 1);

        assert!(steps_per_period(0.01, 0.015).is_err());
        assert!(steps_per_period(0.1, 0.01).is_err());
        assert!(steps_per_period(0.0, 1.0).is_err());
    }

    #[test]
    fn test_rng_is_reproducible() {
        let draw = |seed| {
            let mut nm = manager(seed);
            let mut values = vec![];
            for _ in 0..2 {
                nm.add_node("noop", |ctx| {
                    let mut rng: Xoshiro256StarStar = ctx.get_rng_256();
                    values.push(rng.random::<u64>());
                    Ok(Box::new(Noop))
                })
                .unwrap();
            }
            values
        };

        let a = draw(42);
        assert_eq!(a, draw(42));
        assert_ne!(a, draw(43));
        // Every node gets its own stream
        assert_ne!(a[0], a[1]);
    }

    #[test]
    fn test_creation_error_names_node() {
        let mut nm = manager(1);

        let err = nm
            .add_node("broken", |_| bail!("missing parameter"))
            .unwrap_err();

        assert_eq!(err.to_string(), "Error creating node 'broken'");
        assert!(nm.nodes().is_empty());
    }
}
