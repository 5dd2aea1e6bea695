pub mod drone {
    pub const TELEMETRY: &str = "/drone/telemetry";
    pub const COMMAND: &str = "/drone/command";
}

pub mod rig {
    pub const TELEMETRY: &str = "/rig/telemetry";
    pub const COMMAND: &str = "/rig/command";
}

pub mod replay {
    pub const FRAMES: &str = "/replay/frames";
    pub const COMMAND: &str = "/replay/command";
}
