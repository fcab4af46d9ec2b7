pub mod config;
pub mod error;
pub mod language;

pub use config::{Config, PriorityBand, SearchConfig, WorkerConfig};
pub use error::{KoditError, Result};
