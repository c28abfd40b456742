pub mod scheduler;
pub mod source;

pub use scheduler::{Scheduler, SchedulerOptions};
pub use source::{ChunkSource, HttpChunkSource, LocalChunkSource};
