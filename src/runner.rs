use std::{
    fs,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::{
    core::time::delta_from_secs_f64,
    logging::{ConsumerStats, CsvLogger, LogOptions, spawn_console_monitor, spawn_csv_sink},
    model::ModelBuilder,
    nodes::{FtlOrderedExecutor, NodeManager, RealtimeExecutor, RunLimits, StopToken},
    parameters::{self, ParameterMap},
    telemetry::{TelemetryDispatcher, TelemetryService},
    utils::capacity::Capacity,
};

/// Base step used when no parameter file is given
pub const DEFAULT_DT: f64 = 0.01;

/// Samples a monitor may fall behind before it starts dropping them
const MONITOR_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Realtime,
    /// As fast as possible, on a simulated clock
    Fast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RngSeed {
    #[default]
    Rand,
    Fixed(u64),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    pub seed: RngSeed,
    pub max_steps: Option<usize>,
    /// Write a csv log in this directory
    pub log_dir: Option<PathBuf>,
    pub log: LogOptions,
    pub monitor: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            seed: RngSeed::default(),
            max_steps: None,
            log_dir: None,
            log: LogOptions::default(),
            monitor: true,
        }
    }
}

/// Reads a parameter file, or returns the defaults if `path` is None
pub fn read_parameters(path: Option<&Path>) -> Result<ParameterMap> {
    match path {
        Some(path) => {
            info!("Reading parameters from '{}'", path.display());

            let params_toml = fs::read_to_string(path)
                .with_context(|| format!("Cannot read parameters from '{}'", path.display()))?;
            Ok(parameters::parse_string(&params_toml)?)
        }
        None => {
            info!("No parameter file, using defaults");
            Ok(parameters::parse_string(&format!(
                "[sim]\ndt = {{ type = \"float\", val = {DEFAULT_DT:?} }}"
            ))?)
        }
    }
}

type Consumer = (&'static str, JoinHandle<Result<ConsumerStats>>);

/// Runs a model on a dedicated thread while the log and monitor consume its samples
pub struct SingleThreadedRunner {
    nm: NodeManager,
    mode: ExecutionMode,
    limits: RunLimits,
    consumers: Vec<Consumer>,
}

impl SingleThreadedRunner {
    pub fn new<M: ModelBuilder>(model: &M, params: ParameterMap, options: RunOptions) -> Result<Self> {
        let ts = TelemetryService::default();

        info!("Initalizing node manager");
        let mut nm = match options.seed {
            RngSeed::Fixed(seed) => NodeManager::new_from_seed(ts.clone(), params, seed),
            RngSeed::Rand => NodeManager::new(ts.clone(), params),
        };
        info!("Random seed: {}", nm.seed());

        // Subscribe before building, so the first sample is not missed
        let rx_log = match &options.log_dir {
            Some(_) => Some(ts.subscribe::<M::Sample>(M::TELEMETRY, Capacity::Unbounded)?),
            None => None,
        };
        let rx_monitor = if options.monitor {
            Some(ts.subscribe::<M::Sample>(M::TELEMETRY, MONITOR_CAPACITY.into())?)
        } else {
            None
        };

        model.build(&mut nm)?;

        let mut consumers = vec![];
        if let (Some(rx), Some(dir)) = (rx_log, &options.log_dir) {
            let logger = CsvLogger::in_dir(dir, options.log.clone())?;
            consumers.push(("csv log", spawn_csv_sink(rx, logger)?));
        }
        if let Some(rx) = rx_monitor {
            consumers.push(("monitor", spawn_console_monitor(rx, model.monitor_every())?));
        }

        Ok(Self {
            nm,
            mode: options.mode,
            limits: RunLimits {
                max_steps: options.max_steps,
                stop: StopToken::new(),
            },
            consumers,
        })
    }

    /// Raising this token ends the run after the current step
    pub fn stop_token(&self) -> StopToken {
        self.limits.stop.clone()
    }

    /// Returns the number of steps executed
    pub fn run_blocking(self) -> Result<usize> {
        let params = self.nm.parameters();
        let nm = self.nm;
        let mode = self.mode;
        let limits = self.limits;

        let simulation = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || -> Result<usize> {
                let dt_sec = params.get_param("sim.dt")?.value_float()?;
                let dt = delta_from_secs_f64(dt_sec);

                info!("Simulation dt is {:.2} ms", dt_sec * 1000.0);
                info!("Running simulation ({mode:?})");

                let start_time = Instant::now();
                let steps = match mode {
                    ExecutionMode::Realtime => RealtimeExecutor::run_blocking(nm, dt, limits)?,
                    ExecutionMode::Fast => FtlOrderedExecutor::run_blocking(nm, dt, limits)?,
                };

                let duration = start_time.elapsed().as_secs_f64();
                info!(
                    "Simulation ended after {steps} steps ({:.2} s simulated). Duration: {duration:.6} s",
                    steps as f64 * dt_sec
                );

                Ok(steps)
            })
            .context("Cannot spawn simulation thread")?;

        // The node manager is dropped with the simulation thread, which closes
        // every channel and lets the consumers finish
        let steps = simulation
            .join()
            .map_err(|_| anyhow!("Simulation thread panicked"))?;

        for (name, consumer) in self.consumers {
            match consumer.join() {
                Ok(Ok(stats)) => info!("{name}: {} samples", stats.received),
                Ok(Err(e)) => warn!("{name} failed: {e:#}"),
                Err(_) => warn!("{name} thread panicked"),
            }
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use crate::{
        model::{DroneModel, ReplayModel, ThrustStandModel},
        replay::ReplayLog,
        sim::profile::{Profile, ProfileStep},
    };

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("dronesim-runner-{}", std::process::id()))
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn fast(log_dir: &Path, max_steps: Option<usize>) -> RunOptions {
        RunOptions {
            mode: ExecutionMode::Fast,
            seed: RngSeed::Fixed(42),
            max_steps,
            log_dir: Some(log_dir.to_path_buf()),
            log: LogOptions::default(),
            monitor: false,
        }
    }

    fn read_log(dir: &Path) -> String {
        let entry = fs::read_dir(dir).unwrap().next().unwrap().unwrap();
        fs::read_to_string(entry.path()).unwrap()
    }

    #[test]
    fn test_default_parameters() {
        let params = read_parameters(None).unwrap();
        assert_eq!(params.get_param("sim.dt").unwrap().value_float().unwrap(), 0.01);
    }

    #[test]
    fn test_drone_run_is_logged() {
        let dir = temp_dir("drone");
        let params = parameters::parse_string(
            r#"
            [sim]
            dt = { type = "float", val = 0.1 }

            [drone]
            tick = { type = "float", val = 0.5 }
            "#,
        )
        .unwrap();

        let runner = SingleThreadedRunner::new(&DroneModel, params, fast(&dir, Some(20))).unwrap();
        assert_eq!(runner.run_blocking().unwrap(), 20);

        let log = read_log(&dir);
        let mut lines = log.lines();
        assert!(lines.next().unwrap().starts_with("motor_rpms_0,motor_rpms_1,"));
        assert_eq!(lines.count(), 4);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_profile_ends_the_run() {
        let dir = temp_dir("rig");
        let params = parameters::parse_string(
            r#"
            [sim]
            dt = { type = "float", val = 0.01 }

            [rig]
            tick = { type = "float", val = 0.01 }
            "#,
        )
        .unwrap();

        let model = ThrustStandModel {
            rpm: None,
            profile: Some(Profile::Step {
                steps: vec![
                    ProfileStep {
                        rpm: 1000.0,
                        duration: 0.05,
                    },
                    ProfileStep {
                        rpm: 2000.0,
                        duration: 0.05,
                    },
                ],
                duration: None,
            }),
        };

        let runner = SingleThreadedRunner::new(&model, params, fast(&dir, None)).unwrap();
        // 10 samples, then one more step to notice the end
        assert_eq!(runner.run_blocking().unwrap(), 11);

        let log = read_log(&dir);
        assert_eq!(log.lines().next(), Some("rpm,current,torque,temp,voltage,power"));
        assert_eq!(log.lines().count(), 12);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_replay_round_trip() {
        let dir = temp_dir("replay");
        let log = ReplayLog::from_reader("rpm,temp\n1000,25.5\n2000,26\n".as_bytes()).unwrap();
        let model = ReplayModel {
            log,
            interval: Duration::from_millis(10),
        };

        let runner =
            SingleThreadedRunner::new(&model, read_parameters(None).unwrap(), fast(&dir, None))
                .unwrap();
        assert_eq!(runner.run_blocking().unwrap(), 2);

        assert_eq!(read_log(&dir), "rpm,temp\n1000,25.5\n2000,26\n");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_stop_token_ends_run() {
        let params = read_parameters(None).unwrap();
        let options = RunOptions {
            mode: ExecutionMode::Fast,
            monitor: false,
            ..Default::default()
        };

        let runner = SingleThreadedRunner::new(&DroneModel, params, options).unwrap();
        runner.stop_token().stop();

        assert_eq!(runner.run_blocking().unwrap(), 0);
    }
}
