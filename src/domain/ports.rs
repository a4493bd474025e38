use crate::domain::model::{
    BatchInsert, IngestionReport, LossRecord, PlayerStatistic, RawStatRow, Slice,
};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 取得 HTML 頁面或 AJAX 片段
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> Result<String>;
}

/// 統計 JSON 端點，每個 slice 呼叫一次
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_slice(
        &self,
        domain: &str,
        tournament_id: &str,
        slice: &Slice,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawStatRow>>;
}

/// 統計資料的持久化閘道
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// 刪除某 tournament 既有的全部統計，回傳刪除列數
    async fn delete_by_tournament(&self, tournament_id: &str) -> Result<u64>;

    /// 預先過濾參照不存在的列後，在單一 transaction 內 upsert
    async fn create_batch(&self, stats: &[PlayerStatistic]) -> Result<BatchInsert>;

    /// 單列 upsert，不做預先過濾，由資料庫約束回報錯誤
    async fn create(&self, stat: &PlayerStatistic) -> Result<()>;
}

/// 執行過程的觀測事件；預設實作什麼都不做
pub trait IngestionReporter: Send + Sync {
    fn run_started(&self, _tournament_id: &str, _url: &str) {}

    fn slices_discovered(&self, _tournament_id: &str, _slices: &[Slice]) {}

    fn slice_started(&self, _slice: &Slice) {}

    fn slice_finished(&self, _slice: &Slice, _rows: usize) {}

    fn slice_failed(&self, _slice: &Slice, _error: &EtlError) {}

    fn loss(&self, _tournament_id: &str, _loss: &LossRecord) {}

    fn summary(&self, _report: &IngestionReport) {}
}

pub trait ConfigProvider: Send + Sync {
    fn database_url(&self) -> &str;
    fn concurrent_requests(&self) -> usize;
    fn request_timeout(&self) -> Duration;
    fn user_agent(&self) -> &str;
    fn season(&self) -> Option<&str>;
    fn stats_api_path(&self) -> &str;
}

/// 不輸出任何事件的 reporter
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl IngestionReporter for NoopReporter {}
