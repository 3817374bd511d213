mod checkpoint;
mod data_log;
mod outcome;
mod screen_event;
mod sensor;
mod token;

pub use checkpoint::Checkpoint;
pub use data_log::{DataLogEntry, RecordingMethod, MIXED_SOURCE, UNKNOWN_SOURCE};
pub use outcome::PostOutcome;
pub use screen_event::ScreenEvent;
pub use sensor::{log_types, SensorType};
pub use token::TokenPair;
