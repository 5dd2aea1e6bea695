use std::num::NonZero;

/// Queue size of a telemetry subscriber. Bounded queues drop the oldest
/// element when full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Unbounded,
    Bounded(NonZero<usize>),
}

impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        match NonZero::new(value) {
            Some(v) => Capacity::Bounded(v),
            None => Capacity::Unbounded,
        }
    }
}
