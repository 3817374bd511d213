pub mod chunk;
pub mod coordinator;
pub mod state;

pub use chunk::{plan_chunks, Chunk, ChunkPlanner};
pub use coordinator::{PostCoordinator, PostOptions, PostReport};
pub use state::{PostState, PostStatus};
