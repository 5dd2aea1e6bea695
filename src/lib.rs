pub mod core;
pub mod logging;
pub mod model;
pub mod nodes;
pub mod parameters;
pub mod replay;
pub mod runner;
pub mod sim;
pub mod telemetry;
pub mod utils;
