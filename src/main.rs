use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dronesim::{
    logging::LogOptions,
    model::{DroneModel, ModelBuilder, ReplayModel, ThrustStandModel},
    parameters::ParameterMap,
    replay::{DEFAULT_INTERVAL, ReplayLog, interval_for_speed},
    runner::{DEFAULT_DT, ExecutionMode, RngSeed, RunOptions, SingleThreadedRunner, read_parameters},
    sim::{presets::PresetStore, profile::Profile},
};
use log::info;

const DEFAULT_PARAMS: &str = "config/params.toml";

#[derive(Parser, Debug)]
#[command(version, about = "Drone telemetry and motor thrust stand simulator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Parameter file [default: config/params.toml if present]
    #[arg(short, long, global = true)]
    params: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Stop after this many base steps
    #[arg(long, global = true)]
    steps: Option<usize>,

    /// Stop after this many simulated seconds
    #[arg(short, long, global = true, conflicts_with = "steps")]
    duration: Option<f64>,

    /// Run as fast as possible instead of in real time
    #[arg(long, global = true)]
    fast: bool,

    /// Write a csv log in this directory
    #[arg(short, long, global = true)]
    log_dir: Option<PathBuf>,

    /// Add a timestamp column to the log
    #[arg(long, global = true)]
    timestamp: bool,

    /// Only log these columns
    #[arg(long, global = true, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Do not print samples on the console
    #[arg(long, global = true)]
    no_monitor: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulated drone telemetry
    Drone,

    /// Motor thrust stand
    Rig {
        /// Commanded RPM
        #[arg(short, long, conflicts_with = "preset")]
        rpm: Option<f64>,

        /// Commanded RPM from a named preset
        #[arg(long)]
        preset: Option<String>,

        /// Preset file
        #[arg(long, default_value = "presets.json")]
        presets: PathBuf,

        /// Add a custom preset for this RPM and save the preset file
        #[arg(long)]
        save_preset: Option<u32>,

        /// Print the presets and exit
        #[arg(long)]
        list_presets: bool,

        /// Drive the rig with an RPM profile
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Play back a csv log
    Replay {
        file: PathBuf,

        /// Playback speed, 1 (one frame per second) to 100 [default: one frame every 100 ms]
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
        speed: Option<u32>,
    },
}

fn main() -> Result<()> {
    // Default log level to "info"
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "info") }
    }

    pretty_env_logger::init();

    let args = Args::parse();
    banner();

    let params = load_parameters(args.params.as_deref())?;
    let options = run_options(&args, &params)?;

    match &args.command {
        Commands::Drone => run(&DroneModel, params, options)?,
        Commands::Rig {
            rpm,
            preset,
            presets,
            save_preset,
            list_presets,
            profile,
        } => {
            let mut store = PresetStore::load(presets)?;

            if let Some(rpm) = save_preset {
                if store.add_custom(*rpm) {
                    store.save(presets)?;
                } else {
                    info!("Preset for {rpm} RPM already exists");
                }
            }

            if *list_presets {
                for name in store.names() {
                    println!("{name}");
                }
                return Ok(());
            }

            let rpm = match preset {
                Some(name) => Some(f64::from(store.rpm_of(name)?)),
                None => *rpm,
            };

            let profile = profile
                .as_deref()
                .map(|path| {
                    Profile::from_file(path)
                        .with_context(|| format!("Cannot load profile '{}'", path.display()))
                })
                .transpose()?;

            run(&ThrustStandModel { rpm, profile }, params, options)?;
        }
        Commands::Replay { file, speed } => {
            let log = ReplayLog::load(file)?;
            let interval = speed.map_or(DEFAULT_INTERVAL, interval_for_speed);

            run(&ReplayModel { log, interval }, params, options)?;
        }
    }

    info!("Done");

    Ok(())
}

/// An explicit parameter file must exist, the default one may not
fn load_parameters(path: Option<&Path>) -> Result<ParameterMap> {
    match path {
        Some(path) => read_parameters(Some(path)),
        None => {
            let default = Path::new(DEFAULT_PARAMS);
            read_parameters(default.exists().then_some(default))
        }
    }
}

fn run_options(args: &Args, params: &ParameterMap) -> Result<RunOptions> {
    let max_steps = match args.duration {
        Some(duration) => {
            let dt = params.float_or("sim.dt", DEFAULT_DT)?;
            Some((duration / dt).round() as usize)
        }
        None => args.steps,
    };

    Ok(RunOptions {
        mode: if args.fast {
            ExecutionMode::Fast
        } else {
            ExecutionMode::Realtime
        },
        seed: args.seed.map_or(RngSeed::Rand, RngSeed::Fixed),
        max_steps,
        log_dir: args.log_dir.clone(),
        log: LogOptions {
            timestamp: args.timestamp,
            columns: args.columns.clone(),
        },
        monitor: !args.no_monitor,
    })
}

fn run<M: ModelBuilder>(model: &M, params: ParameterMap, options: RunOptions) -> Result<()> {
    let runner = SingleThreadedRunner::new(model, params, options)?;

    let stop = runner.stop_token();
    ctrlc::set_handler(move || {
        info!("Stopping...");
        stop.stop();
    })
    .context("Cannot set the Ctrl-C handler")?;

    runner.run_blocking()?;

    Ok(())
}

fn banner() {
    println!(r"   __         __");
    println!(r"  /  \.-'''-./  \");
    println!(r"  \    -   -    /   DRONESIM");
    println!(r"   |   o   o   |");
    println!(r"   \  .-'''-.  /");
    println!(r"    '-\__Y__/-'");
}
