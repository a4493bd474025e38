mod common;

use async_trait::async_trait;
use common::*;
use hockey_stats_etl::adapters::storage::SqliteStatsRepository;
use hockey_stats_etl::domain::model::{BatchInsert, LossReason, PlayerStatistic};
use hockey_stats_etl::domain::ports::{NoopReporter, StatsRepository};
use hockey_stats_etl::{EtlError, HttpClient, IngestionEngine, Result};
use httpmock::prelude::*;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn engine<R: StatsRepository>(repository: R) -> IngestionEngine<HttpClient, HttpClient, R> {
    let http = http_client();
    IngestionEngine::new(http.clone(), http, repository, Arc::new(NoopReporter)).with_concurrency(2)
}

/// 批次寫入永遠失敗，逐筆寫入交給真正的 SQLite
struct BrokenBatchRepository(SqliteStatsRepository);

#[async_trait]
impl StatsRepository for BrokenBatchRepository {
    async fn delete_by_tournament(&self, tournament_id: &str) -> Result<u64> {
        self.0.delete_by_tournament(tournament_id).await
    }

    async fn create_batch(&self, _stats: &[PlayerStatistic]) -> Result<BatchInsert> {
        Err(EtlError::PersistenceTransactionFailure {
            message: "database is locked".to_string(),
        })
    }

    async fn create(&self, stat: &PlayerStatistic) -> Result<()> {
        self.0.create(stat).await
    }
}

/// 記錄每次清除刪掉的列數，其餘交給真正的 SQLite
struct RecordingRepository {
    inner: SqliteStatsRepository,
    deleted: Mutex<Vec<u64>>,
}

#[async_trait]
impl StatsRepository for RecordingRepository {
    async fn delete_by_tournament(&self, tournament_id: &str) -> Result<u64> {
        let deleted = self.inner.delete_by_tournament(tournament_id).await?;
        self.deleted.lock().unwrap().push(deleted);
        Ok(deleted)
    }

    async fn create_batch(&self, stats: &[PlayerStatistic]) -> Result<BatchInsert> {
        self.inner.create_batch(stats).await
    }

    async fn create(&self, stat: &PlayerStatistic) -> Result<()> {
        self.inner.create(stat).await
    }
}

#[tokio::test]
async fn test_end_to_end_tournament_ingestion() {
    let server = MockServer::start();
    let mocks = mount_scenario(&server);
    let engine = engine(seeded_repository().await);

    let report = engine
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap();

    for mock in &mocks {
        mock.assert();
    }

    assert_eq!(report.slices_discovered, 2);
    assert_eq!(report.slices_failed, 0);
    assert_eq!(report.received, 15);
    assert_eq!(report.saved, 12);
    assert_eq!(report.lost(), 3);
    assert_eq!(report.losses.len(), 3);

    let by_reason = report.losses_by_reason();
    assert_eq!(by_reason.get(&LossReason::ConversionError), Some(&2));
    assert_eq!(by_reason.get(&LossReason::TeamNotFound), Some(&1));
    assert_eq!(by_reason.get(&LossReason::PlayerNotFound), None);

    let team_loss = report
        .losses
        .iter()
        .find(|l| l.reason == LossReason::TeamNotFound)
        .unwrap();
    assert_eq!(team_loss.player_id, "13");
    assert_eq!(team_loss.team_id, UNKNOWN_TEAM);
    assert_eq!(team_loss.birth_year, 2009);

    let stored = engine
        .repository()
        .find_by_tournament(TOURNAMENT_ID)
        .await
        .unwrap();
    assert_eq!(stored.len(), 12);

    let first = stored.iter().find(|s| s.player_id == "1").unwrap();
    assert_eq!(first.team_id, KNOWN_TEAM);
    assert_eq!(first.group_name, "Группа А");
    assert_eq!(first.birth_year, 2009);
    assert_eq!(first.games, 12);
    assert_eq!(first.goals, 4);
    assert_eq!(first.penalty_minutes, 2);
    assert!((first.goals_per_game - 0.33).abs() < 1e-9);
}

#[tokio::test]
async fn test_reingestion_is_idempotent() {
    let server = MockServer::start();
    let _mocks = mount_scenario(&server);
    let engine = engine(RecordingRepository {
        inner: seeded_repository().await,
        deleted: Mutex::new(Vec::new()),
    });
    let cancel = CancellationToken::new();

    let first_saved = engine
        .parse_tournament_stats(&cancel, &server.base_url(), TOURNAMENT_PATH, TOURNAMENT_ID)
        .await
        .unwrap();
    let first = engine
        .repository()
        .inner
        .find_by_tournament(TOURNAMENT_ID)
        .await
        .unwrap();

    let second_saved = engine
        .parse_tournament_stats(&cancel, &server.base_url(), TOURNAMENT_PATH, TOURNAMENT_ID)
        .await
        .unwrap();
    let second = engine
        .repository()
        .inner
        .find_by_tournament(TOURNAMENT_ID)
        .await
        .unwrap();

    assert_eq!(first_saved, 12);
    assert_eq!(second_saved, 12);
    assert_eq!(first, second);
    // 第二次清除剛好刪掉第一次寫入的 12 列
    assert_eq!(*engine.repository().deleted.lock().unwrap(), vec![0, 12]);
}

#[tokio::test]
async fn test_cancelled_run_leaves_stored_statistics_untouched() {
    let server = MockServer::start();
    let _mocks = mount_scenario(&server);
    let engine = engine(seeded_repository().await);

    engine
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .run(&cancel, &server.base_url(), TOURNAMENT_PATH, TOURNAMENT_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Cancelled));
    assert_eq!(
        engine
            .repository()
            .count_by_tournament(TOURNAMENT_ID)
            .await
            .unwrap(),
        12
    );
}

#[tokio::test]
async fn test_batch_failure_falls_back_to_row_by_row() {
    let server = MockServer::start();
    let _mocks = mount_scenario(&server);
    let engine = engine(BrokenBatchRepository(seeded_repository().await));

    let report = engine
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap();

    assert_eq!(report.received, 15);
    assert_eq!(report.saved, 12);
    let by_reason = report.losses_by_reason();
    assert_eq!(by_reason.get(&LossReason::ConversionError), Some(&2));
    assert_eq!(by_reason.get(&LossReason::TeamNotFound), Some(&1));
    assert_eq!(
        engine
            .repository()
            .0
            .count_by_tournament(TOURNAMENT_ID)
            .await
            .unwrap(),
        12
    );
}

#[tokio::test]
async fn test_unknown_player_is_reported_as_player_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TOURNAMENT_PATH);
        then.status(200)
            .body(tournament_page(&[year_option("1794", "2009")]));
    });
    server.mock(|when, then| {
        when.method(GET).path(year_ajax_path("1794"));
        then.status(200).body("<div></div>");
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(hockey_stats_etl::adapters::http::DEFAULT_STATS_API_PATH)
            .query_param("year", "1794");
        then.status(200).json_body(serde_json::json!({
            "data": [stat_row(1, KNOWN_TEAM), stat_row(500, KNOWN_TEAM)]
        }));
    });

    let report = engine(seeded_repository().await)
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap();

    assert_eq!(report.slices_discovered, 1);
    assert_eq!(report.received, 2);
    assert_eq!(report.saved, 1);
    assert_eq!(report.losses[0].reason, LossReason::PlayerNotFound);
    assert_eq!(report.losses[0].player_id, "500");
}

#[tokio::test]
async fn test_failing_slice_is_skipped_and_counted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TOURNAMENT_PATH);
        then.status(200)
            .body(tournament_page(&[year_option("1794", "2009")]));
    });
    server.mock(|when, then| {
        when.method(GET).path(year_ajax_path("1794"));
        then.status(200)
            .body(group_fragment("1794", &[("11", "Группа А"), ("12", "Группа Б")]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(hockey_stats_etl::adapters::http::DEFAULT_STATS_API_PATH)
            .query_param("group", "11");
        then.status(200)
            .json_body(serde_json::json!({"data": [stat_row(1, KNOWN_TEAM)]}));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(hockey_stats_etl::adapters::http::DEFAULT_STATS_API_PATH)
            .query_param("group", "12");
        then.status(500);
    });

    let report = engine(seeded_repository().await)
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap();

    assert_eq!(report.slices_discovered, 2);
    assert_eq!(report.slices_failed, 1);
    assert_eq!(report.received, 1);
    assert_eq!(report.saved, 1);
}

#[tokio::test]
async fn test_missing_tournament_page_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TOURNAMENT_PATH);
        then.status(404);
    });

    let err = engine(seeded_repository().await)
        .run(
            &CancellationToken::new(),
            &server.base_url(),
            TOURNAMENT_PATH,
            TOURNAMENT_ID,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::DiscoveryFailure { .. }));
}
