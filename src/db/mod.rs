mod connection;
mod helpers;
pub(crate) mod migrations;
mod repositories;

pub use connection::{ActorError, Database};
