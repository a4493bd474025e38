use crate::adapters::http::{DEFAULT_STATS_API_PATH, DEFAULT_USER_AGENT};
use crate::config::DEFAULT_DATABASE_URL;
use crate::core::ConfigProvider;
use crate::domain::services::normalize_domain;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_CONCURRENT_REQUESTS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tournaments: Vec<TournamentTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub domain: String,
    pub user_agent: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub stats_api_path: Option<String>,
    pub season: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub init_schema: Option<bool>,
}

/// 一個要抓取的 tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentTarget {
    pub path: String,
    pub id: String,
    /// 覆寫 `[source].domain`
    pub domain: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATABASE_URL})；未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn domain(&self) -> &str {
        &self.source.domain
    }

    pub fn init_schema(&self) -> bool {
        self.database.init_schema.unwrap_or(false)
    }

    /// (domain, path, id)，tournament 沒有指定 domain 時使用 `[source].domain`
    pub fn targets(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.tournaments.iter().map(move |t| {
            (
                t.domain.as_deref().unwrap_or(&self.source.domain),
                t.path.as_str(),
                t.id.as_str(),
            )
        })
    }
}

impl ConfigProvider for TomlConfig {
    fn database_url(&self) -> &str {
        self.database.url.as_deref().unwrap_or(DEFAULT_DATABASE_URL)
    }

    fn concurrent_requests(&self) -> usize {
        self.extract
            .concurrent_requests
            .unwrap_or(DEFAULT_CONCURRENT_REQUESTS)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    fn user_agent(&self) -> &str {
        self.source.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    fn season(&self) -> Option<&str> {
        self.source.season.as_deref()
    }

    fn stats_api_path(&self) -> &str {
        self.source
            .stats_api_path
            .as_deref()
            .unwrap_or(DEFAULT_STATS_API_PATH)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_url("source.domain", &normalize_domain(&self.source.domain))?;
        validate_non_empty_string("database.url", self.database_url())?;
        validate_positive_number("extract.concurrent_requests", self.concurrent_requests(), 1)?;
        validate_positive_number(
            "source.timeout_seconds",
            self.request_timeout().as_secs() as usize,
            1,
        )?;

        if self.tournaments.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "tournaments".to_string(),
            });
        }

        for (index, target) in self.tournaments.iter().enumerate() {
            validate_non_empty_string(&format!("tournaments[{}].path", index), &target.path)?;
            validate_non_empty_string(&format!("tournaments[{}].id", index), &target.id)?;
            if let Some(domain) = &target.domain {
                validate_url(
                    &format!("tournaments[{}].domain", index),
                    &normalize_domain(domain),
                )?;
            }
        }

        Ok(())
    }
}
