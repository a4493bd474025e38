pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::http::HttpClient;
pub use adapters::storage::SqliteStatsRepository;
pub use core::etl::IngestionEngine;
pub use domain::model::{IngestionReport, LossReason, LossRecord, PlayerStatistic, Slice};
pub use utils::error::{EtlError, Result};
