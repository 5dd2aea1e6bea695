mod consumers;
mod csv_logger;
mod record;

pub use consumers::*;
pub use csv_logger::*;
pub use record::*;
