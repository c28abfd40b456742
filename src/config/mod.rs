pub mod loader;
pub mod settings;

pub use settings::{SchedulerConfig, ZimuConfig};
