pub mod channels;
pub mod control;
pub mod drone;
pub mod presets;
pub mod profile;
pub mod rig;

#[cfg(test)]
pub(crate) mod testing;

/// Rounds half away from zero to `decimals` decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
