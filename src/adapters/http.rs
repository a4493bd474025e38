use crate::domain::model::{RawStatRow, Slice, StatsEnvelope};
use crate::domain::ports::{ConfigProvider, PageFetcher, StatsSource};
use crate::domain::services::normalize_domain;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_STATS_API_PATH: &str = "/local/ajax/v2/competitions-stats/";
pub const DEFAULT_USER_AGENT: &str = concat!("hockey-stats-etl/", env!("CARGO_PKG_VERSION"));

/// 一次取回全部資料的頁長
pub const PAGE_LENGTH: u32 = 10_000;

/// 球季從八月開始：2025-10 → "2025-2026"，2026-03 → "2025-2026"
pub fn season_for(date: NaiveDate) -> String {
    let start = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

pub fn current_season() -> String {
    season_for(Utc::now().date_naive())
}

/// 組出統計端點 URL；整體統計 slice 不帶 group 參數
pub fn build_stats_url(
    domain: &str,
    api_path: &str,
    tournament_id: &str,
    slice: &Slice,
    season: &str,
) -> Result<Url> {
    let base = normalize_domain(domain);
    let mut url = Url::parse(&base)
        .and_then(|base| base.join(api_path))
        .map_err(|e| EtlError::InvalidValueError {
            field: "stats_api_path".to_string(),
            value: format!("{}{}", base, api_path),
            reason: e.to_string(),
        })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("key", "scorers");
        query.append_pair("comp", tournament_id);
        query.append_pair("year", &slice.year_id);
        if !slice.is_aggregate() {
            query.append_pair("group", &slice.group_id);
        }
        query.append_pair("season", season);
        query.append_pair("start", "0");
        query.append_pair("length", &PAGE_LENGTH.to_string());
    }

    Ok(url)
}

/// reqwest 實作的頁面抓取與統計 API 客戶端
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    stats_api_path: String,
    season: String,
}

impl HttpClient {
    pub fn new(client: Client, stats_api_path: impl Into<String>, season: impl Into<String>) -> Self {
        Self {
            client,
            stats_api_path: stats_api_path.into(),
            season: season.into(),
        }
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent())
            .build()?;
        let season = config
            .season()
            .map(str::to_string)
            .unwrap_or_else(current_season);

        Ok(Self::new(client, config.stats_api_path(), season))
    }

    pub fn season(&self) -> &str {
        &self.season
    }

    /// 可取消的 GET，狀態碼必須是 200
    async fn get_text(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        let request = async {
            let response = self.client.get(url).send().await?;
            if response.status() != StatusCode::OK {
                return Err(EtlError::UnexpectedStatus {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }
            Ok::<String, EtlError>(response.text().await?)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EtlError::Cancelled),
            result = request => result,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        tracing::debug!("🌐 GET {}", url);
        self.get_text(url, cancel).await
    }
}

#[async_trait]
impl StatsSource for HttpClient {
    async fn fetch_slice(
        &self,
        domain: &str,
        tournament_id: &str,
        slice: &Slice,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawStatRow>> {
        let url = build_stats_url(domain, &self.stats_api_path, tournament_id, slice, &self.season)?;
        tracing::debug!("📡 Fetching slice {} from {}", slice, url);

        let body = match self.get_text(url.as_str(), cancel).await {
            Ok(body) => body,
            Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
            Err(e) => {
                return Err(EtlError::SliceFetchFailure {
                    slice: slice.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let envelope: StatsEnvelope =
            serde_json::from_str(&body).map_err(|e| EtlError::SliceFetchFailure {
                slice: slice.to_string(),
                message: format!("malformed JSON envelope: {}", e),
            })?;

        if let Some(total) = envelope.records_total {
            if total as usize > envelope.data.len() {
                tracing::warn!(
                    "⚠️ Slice {} reports {} records but returned {}",
                    slice,
                    total,
                    envelope.data.len()
                );
            }
        }

        Ok(envelope.data)
    }
}
