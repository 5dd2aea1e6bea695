pub mod capacity;
pub mod ringchannel;
