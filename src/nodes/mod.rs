mod executor;
mod node;

pub use executor::*;
pub use node::*;
