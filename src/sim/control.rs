use crate::telemetry::{TelemetryReceiver, Timestamped};

/// Commands accepted by the simulator and replay nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SetRpm(f64),
    /// Advance a paused replay by one frame
    Step,
    Shutdown,
}

/// Drains every command queued on `rx` without blocking
pub fn pending_commands(rx: &TelemetryReceiver<Command>) -> impl Iterator<Item = Command> + '_ {
    std::iter::from_fn(move || rx.try_recv().ok().map(|Timestamped(_, cmd)| cmd))
}
