use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use log::{debug, warn};

use crate::core::time::{Clock, SimulatedClock, SystemClock};

use super::{NodeManager, StepResult};

/// Shared flag used to ask a running executor to stop after the current step
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Conditions, other than a node returning `StepResult::Stop`, that end a run
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub max_steps: Option<usize>,
    pub stop: StopToken,
}

impl RunLimits {
    fn reached(&self, steps: usize) -> bool {
        self.stop.is_stopped() || self.max_steps.is_some_and(|max| steps >= max)
    }
}

/// Steps every node once, in order. Returns true if the run should end.
fn step_all(
    node_mgr: &mut NodeManager,
    i: usize,
    dt: TimeDelta,
    clock: &dyn Clock,
) -> Result<bool> {
    let mut stop = false;

    for (name, node) in node_mgr.nodes_mut().iter_mut() {
        let res = node
            .step(i, dt, clock)
            .with_context(|| format!("Node {}: step() reported an error", name))?;

        if let StepResult::Stop = res {
            debug!("Node {name} requested to stop");
            stop = true;
        }
    }

    Ok(stop)
}

/// Runs the nodes as fast as possible on a simulated clock
pub struct FtlOrderedExecutor;

impl FtlOrderedExecutor {
    /// Returns the number of steps executed
    pub fn run_blocking(
        mut node_mgr: NodeManager,
        simulated_step_period: TimeDelta,
        limits: RunLimits,
    ) -> Result<usize> {
        let mut clock = SimulatedClock::new(Utc::now(), TimeDelta::zero());

        let mut i = 0;
        while !limits.reached(i) {
            clock.step(simulated_step_period);

            let stop = step_all(&mut node_mgr, i, simulated_step_period, &clock)?;
            i += 1;

            if stop {
                break;
            }
        }

        Ok(i)
    }
}

/// Runs the nodes on the wall clock, one step every `step_period`.
///
/// Deadlines are absolute, so a late step does not delay the ones after it.
pub struct RealtimeExecutor;

impl RealtimeExecutor {
    /// Returns the number of steps executed
    pub fn run_blocking(
        mut node_mgr: NodeManager,
        step_period: TimeDelta,
        limits: RunLimits,
    ) -> Result<usize> {
        let clock = SystemClock::new();
        let period = step_period
            .to_std()
            .context("Realtime step period must be positive")?;

        let start = Instant::now();
        let mut overruns = 0usize;

        let mut i = 0;
        while !limits.reached(i) {
            let stop = step_all(&mut node_mgr, i, step_period, &clock)?;
            i += 1;

            if stop {
                break;
            }

            let deadline = start + period * i as u32;
            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            } else {
                overruns += 1;
            }
        }

        if overruns > 0 {
            warn!("{overruns} of {i} steps missed their deadline");
        }

        Ok(i)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::{core::time::seconds_f64, parameters::ParameterMap, telemetry::TelemetryService};

    use super::*;
    use crate::nodes::Node;

    struct Recorder {
        name: &'static str,
        stop_at: Option<usize>,
        log: Arc<Mutex<Vec<(&'static str, usize, f64)>>>,
    }

    impl Node for Recorder {
        fn step(&mut self, i: usize, _: TimeDelta, clock: &dyn Clock) -> Result<StepResult> {
            self.log.lock().unwrap().push((
                self.name,
                i,
                seconds_f64(clock.monotonic().elapsed()),
            ));

            if self.stop_at == Some(i) {
                Ok(StepResult::Stop)
            } else {
                Ok(StepResult::Continue)
            }
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, usize, f64)>>>;

    fn manager(stop_at: Option<usize>) -> (NodeManager, Log) {
        let log: Log = Arc::default();
        let mut nm =
            NodeManager::new_from_seed(TelemetryService::default(), ParameterMap::default(), 0);

        for (name, stop_at) in [("first", None), ("second", stop_at)] {
            let log = log.clone();
            nm.add_node(name, move |_| {
                Ok(Box::new(Recorder {
                    name,
                    stop_at,
                    log,
                }))
            })
            .unwrap();
        }

        (nm, log)
    }

    #[test]
    fn test_ftl_order_and_stop() {
        let (nm, log) = manager(Some(2));

        let steps =
            FtlOrderedExecutor::run_blocking(nm, TimeDelta::milliseconds(10), RunLimits::default())
                .unwrap();

        assert_eq!(steps, 3);

        let log = log.lock().unwrap();
        let names: Vec<_> = log.iter().map(|(n, i, _)| (*n, *i)).collect();
        assert_eq!(
            names,
            vec![
                ("first", 0),
                ("second", 0),
                ("first", 1),
                ("second", 1),
                ("first", 2),
                ("second", 2)
            ]
        );

        // Simulated time advances before the nodes are stepped
        approx::assert_relative_eq!(log[5].2, 0.03, epsilon = 1e-9);
    }

    #[test]
    fn test_ftl_max_steps() {
        let (nm, log) = manager(None);

        let limits = RunLimits {
            max_steps: Some(5),
            ..Default::default()
        };
        let steps = FtlOrderedExecutor::run_blocking(nm, TimeDelta::milliseconds(10), limits)
            .unwrap();

        assert_eq!(steps, 5);
        assert_eq!(log.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_stop_token() {
        let (nm, log) = manager(None);

        let limits = RunLimits::default();
        limits.stop.stop();

        let steps = FtlOrderedExecutor::run_blocking(nm, TimeDelta::milliseconds(10), limits)
            .unwrap();

        assert_eq!(steps, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_realtime_paces_steps() {
        let (nm, _) = manager(None);

        let limits = RunLimits {
            max_steps: Some(5),
            ..Default::default()
        };

        let start = Instant::now();
        let steps =
            RealtimeExecutor::run_blocking(nm, TimeDelta::milliseconds(10), limits).unwrap();

        assert_eq!(steps, 5);
        assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    }
}
