mod player;
mod reader;

pub use player::*;
pub use reader::*;
