pub mod account;
pub mod entry;
pub mod settings;
pub mod timetable;

pub use account::*;
pub use entry::*;
pub use settings::*;
pub use timetable::*;
