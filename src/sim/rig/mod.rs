pub mod node;
pub mod sample;
pub mod state;
