use crate::adapters::http::{DEFAULT_STATS_API_PATH, DEFAULT_USER_AGENT};
use crate::config::DEFAULT_DATABASE_URL;
use crate::core::ConfigProvider;
use crate::domain::services::normalize_domain;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_url, Validate,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "hockey-stats-etl")]
#[command(about = "Scrapes per-player tournament statistics into a relational store")]
pub struct CliConfig {
    /// Tournament site domain, e.g. fhr.ru
    #[arg(long, required_unless_present = "config")]
    pub domain: Option<String>,

    /// Tournament page path, e.g. /tournaments/pervenstvo-rossii/
    #[arg(long, required_unless_present = "config")]
    pub tournament_path: Option<String>,

    #[arg(long, required_unless_present = "config")]
    pub tournament_id: Option<String>,

    /// TOML file with one or more tournaments
    #[arg(long, conflicts_with_all = ["domain", "tournament_path", "tournament_id"])]
    pub config: Option<PathBuf>,

    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    #[arg(long, default_value = "4")]
    pub concurrent_requests: usize,

    #[arg(long, default_value = "30")]
    pub timeout_seconds: u64,

    /// Season override, e.g. 2025-2026
    #[arg(long)]
    pub season: Option<String>,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    #[arg(long, default_value = DEFAULT_STATS_API_PATH)]
    pub stats_api_path: String,

    #[arg(long, help = "Create the tables if they do not exist")]
    pub init_schema: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliConfig {
    /// (domain, path, id)；使用 --config 時為 None
    pub fn tournament(&self) -> Option<(&str, &str, &str)> {
        match (&self.domain, &self.tournament_path, &self.tournament_id) {
            (Some(domain), Some(path), Some(id)) => Some((domain, path, id)),
            _ => None,
        }
    }
}

impl ConfigProvider for CliConfig {
    fn database_url(&self) -> &str {
        &self.database_url
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn season(&self) -> Option<&str> {
        self.season.as_deref()
    }

    fn stats_api_path(&self) -> &str {
        &self.stats_api_path
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some((domain, path, id)) = self.tournament() {
            validate_url("domain", &normalize_domain(domain))?;
            validate_non_empty_string("tournament_path", path)?;
            validate_non_empty_string("tournament_id", id)?;
        }
        validate_non_empty_string("database_url", &self.database_url)?;
        validate_positive_number("concurrent_requests", self.concurrent_requests, 1)?;
        validate_positive_number("timeout_seconds", self.timeout_seconds as usize, 1)?;
        validate_non_empty_string("stats_api_path", &self.stats_api_path)?;
        if let Some(season) = &self.season {
            validate_non_empty_string("season", season)?;
        }
        Ok(())
    }
}
