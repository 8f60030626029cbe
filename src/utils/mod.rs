pub mod logging;
pub mod single_flight;

pub use logging::truncate_text;
pub use single_flight::{BusyFlag, BusyGuard};
