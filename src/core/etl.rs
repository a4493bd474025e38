use crate::core::fallback::{batch_then_each, Granularity};
use crate::domain::model::{
    IngestionReport, LossReason, LossRecord, PlayerStatistic, RawStatRow, Slice,
};
use crate::domain::ports::{IngestionReporter, PageFetcher, StatsRepository, StatsSource};
use crate::domain::services::discovery::CombinationDiscoverer;
use crate::domain::services::normalizer::normalize_rows;
use crate::domain::services::resolve_url;
use crate::utils::error::{EtlError, Result};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionStage {
    Discovering,
    Fetching,
    Normalizing,
    Clearing,
    Persisting,
    RetryingRowByRow,
    Reporting,
    Done,
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionStage::Discovering => "discovering",
            IngestionStage::Fetching => "fetching",
            IngestionStage::Normalizing => "normalizing",
            IngestionStage::Clearing => "clearing",
            IngestionStage::Persisting => "persisting",
            IngestionStage::RetryingRowByRow => "retrying_row_by_row",
            IngestionStage::Reporting => "reporting",
            IngestionStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// 資料庫錯誤訊息提到 team 時視為 team 不存在，其餘一律視為 player 不存在
pub fn classify_persistence_error(error: &EtlError) -> LossReason {
    if error.to_string().to_lowercase().contains("team") {
        LossReason::TeamNotFound
    } else {
        LossReason::PlayerNotFound
    }
}

/// 單一 tournament 的 discovery → fetch → normalize → clear → persist → report
pub struct IngestionEngine<F, S, R>
where
    F: PageFetcher,
    S: StatsSource,
    R: StatsRepository,
{
    fetcher: F,
    source: S,
    repository: R,
    reporter: Arc<dyn IngestionReporter>,
    concurrency: usize,
}

impl<F, S, R> IngestionEngine<F, S, R>
where
    F: PageFetcher,
    S: StatsSource,
    R: StatsRepository,
{
    pub fn new(fetcher: F, source: S, repository: R, reporter: Arc<dyn IngestionReporter>) -> Self {
        Self {
            fetcher,
            source,
            repository,
            reporter,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// 只回傳儲存筆數
    pub async fn parse_tournament_stats(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        tournament_path: &str,
        tournament_id: &str,
    ) -> Result<usize> {
        let report = self.run(cancel, domain, tournament_path, tournament_id).await?;
        Ok(report.saved)
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        tournament_path: &str,
        tournament_id: &str,
    ) -> Result<IngestionReport> {
        let mut report = IngestionReport::new(tournament_id);
        let page_url =
            resolve_url(domain, tournament_path).unwrap_or_else(|_| tournament_path.to_string());
        self.reporter.run_started(tournament_id, &page_url);

        // Discover
        self.enter(tournament_id, IngestionStage::Discovering);
        let slices = CombinationDiscoverer::new(&self.fetcher, self.concurrency)
            .discover(domain, tournament_path, cancel)
            .await?;
        report.slices_discovered = slices.len();
        self.reporter.slices_discovered(tournament_id, &slices);

        // Fetch
        self.enter(tournament_id, IngestionStage::Fetching);
        let (raw_rows, failed) = self.fetch_slices(domain, tournament_id, &slices, cancel).await?;
        report.slices_failed = failed;
        report.received = raw_rows.len();

        if raw_rows.is_empty() {
            tracing::warn!("⚠️ Tournament {}: no rows received, nothing to store", tournament_id);
            return Ok(self.finish(report));
        }

        // Normalize
        self.enter(tournament_id, IngestionStage::Normalizing);
        let normalized = normalize_rows(tournament_id, &raw_rows);
        drop(raw_rows);
        for loss in normalized.rejected {
            self.reporter.loss(tournament_id, &loss);
            report.losses.push(loss);
        }
        let entities = normalized.accepted;

        // 取消時不可清除舊資料
        if cancel.is_cancelled() {
            tracing::warn!("🛑 Tournament {}: cancelled before clearing", tournament_id);
            return Err(EtlError::Cancelled);
        }

        // Clear
        self.enter(tournament_id, IngestionStage::Clearing);
        let deleted = self
            .repository
            .delete_by_tournament(tournament_id)
            .await
            .map_err(|e| EtlError::ClearFailure {
                tournament_id: tournament_id.to_string(),
                message: e.to_string(),
            })?;
        tracing::info!("🗑️ Tournament {}: cleared {} stored rows", tournament_id, deleted);

        // Persist
        if !entities.is_empty() {
            self.enter(tournament_id, IngestionStage::Persisting);
            let saved = self.persist(tournament_id, &entities, &mut report).await;
            report.saved = saved;
        }

        Ok(self.finish(report))
    }

    async fn fetch_slices(
        &self,
        domain: &str,
        tournament_id: &str,
        slices: &[Slice],
        cancel: &CancellationToken,
    ) -> Result<(Vec<RawStatRow>, usize)> {
        let results: Vec<(&Slice, Result<Vec<RawStatRow>>)> = stream::iter(slices)
            .map(|slice| async move {
                self.reporter.slice_started(slice);
                let fetched = self
                    .source
                    .fetch_slice(domain, tournament_id, slice, cancel)
                    .await;
                (slice, fetched)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut rows = Vec::new();
        let mut failed = 0;
        for (slice, fetched) in results {
            match fetched {
                Ok(slice_rows) => {
                    self.reporter.slice_finished(slice, slice_rows.len());
                    rows.extend(slice_rows.into_iter().map(|row| row.tag(slice)));
                }
                Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
                Err(e) => {
                    self.reporter.slice_failed(slice, &e);
                    failed += 1;
                }
            }
        }

        Ok((rows, failed))
    }

    async fn persist(
        &self,
        tournament_id: &str,
        entities: &[PlayerStatistic],
        report: &mut IngestionReport,
    ) -> usize {
        let repository = &self.repository;
        let outcome = batch_then_each(
            entities,
            |all| async move {
                let inserted = repository.create_batch(all).await?;
                let skipped: Vec<LossRecord> = inserted
                    .skipped
                    .into_iter()
                    .map(|(stat, missing)| stat.loss(missing.loss_reason()))
                    .collect();
                Ok::<_, EtlError>((inserted.affected, skipped))
            },
            |stat| repository.create(stat),
            |stat, e| {
                tracing::debug!(
                    "🗄️ Row player={} team={} rejected: {}",
                    stat.player_id,
                    stat.team_id,
                    e
                );
                stat.loss(classify_persistence_error(&e))
            },
        )
        .await;

        if outcome.granularity == Granularity::PerUnit {
            self.enter(tournament_id, IngestionStage::RetryingRowByRow);
        }

        for loss in outcome.rejected {
            self.reporter.loss(tournament_id, &loss);
            report.losses.push(loss);
        }

        outcome.succeeded as usize
    }

    fn finish(&self, report: IngestionReport) -> IngestionReport {
        self.enter(&report.tournament_id, IngestionStage::Reporting);
        self.reporter.summary(&report);
        self.enter(&report.tournament_id, IngestionStage::Done);
        report
    }

    fn enter(&self, tournament_id: &str, stage: IngestionStage) {
        tracing::debug!(tournament_id, %stage, "➡️ Stage {}", stage);
    }
}
