//! Health-data sync core: batches records from the platform health store,
//! reconciles overlaps, and posts them to the analytics backend in
//! size-bounded chunks.

pub mod auth;
pub mod batching;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod overlap;
pub mod posting;
pub mod remote;
pub mod sdk;
pub mod source;
pub mod store;
pub mod time;
pub mod utils;
pub mod worker;

pub use config::{ChunkStrategy, Environment, SdkSettings, SettingsStore};
pub use db::Database;
pub use errors::{AuthError, ErrorLogger, LogErrorLogger, PostError, RemoteError};
pub use models::{DataLogEntry, PostOutcome, RecordingMethod, SensorType, TokenPair};
pub use posting::{PostState, PostStatus};
pub use sdk::HealthSync;
pub use source::{AggregateBucket, AggregationPeriod, HealthSource, RawRecord, RecordSegment};
pub use utils::init_logging;
