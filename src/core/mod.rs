pub mod etl;
pub mod fallback;

pub use crate::domain::ports::{ConfigProvider, IngestionReporter, StatsRepository};
pub use crate::utils::error::Result;
pub use etl::{IngestionEngine, IngestionStage};
