pub mod controller;
pub mod loop_worker;

pub use controller::BackgroundController;
pub use loop_worker::SyncTask;
