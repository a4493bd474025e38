#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::{TomlConfig, TournamentTarget};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://hockey_stats.db";
