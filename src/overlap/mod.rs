pub mod config;
pub mod filter;

pub use config::OverlapConfig;
pub use filter::filter_overlaps;
