pub mod aggregator;
pub mod convert;
pub mod device;

pub use aggregator::BatchAggregator;
pub use device::DeviceLockRecorder;
