use crate::adapters::schema::{create_tables, MISSING_PLAYER, MISSING_TEAM};
use crate::domain::model::{BatchInsert, MissingReference, PlayerStatistic};
use crate::domain::ports::StatsRepository;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

const UPSERT_SQL: &str = r#"
    INSERT INTO player_statistics
    (tournament_id, player_id, team_id, group_name, birth_year,
     games, goals, assists, points, plus, minus, plus_minus, penalty_minutes,
     even_strength_goals, power_play_goals, short_handed_goals, overtime_goals,
     hat_tricks, game_winning_goals, goals_per_game, points_per_game,
     penalty_minutes_per_game, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23)
    ON CONFLICT(tournament_id, player_id, group_name, birth_year) DO UPDATE SET
        team_id = excluded.team_id,
        games = excluded.games,
        goals = excluded.goals,
        assists = excluded.assists,
        points = excluded.points,
        plus = excluded.plus,
        minus = excluded.minus,
        plus_minus = excluded.plus_minus,
        penalty_minutes = excluded.penalty_minutes,
        even_strength_goals = excluded.even_strength_goals,
        power_play_goals = excluded.power_play_goals,
        short_handed_goals = excluded.short_handed_goals,
        overtime_goals = excluded.overtime_goals,
        hat_tricks = excluded.hat_tricks,
        game_winning_goals = excluded.game_winning_goals,
        goals_per_game = excluded.goals_per_game,
        points_per_game = excluded.points_per_game,
        penalty_minutes_per_game = excluded.penalty_minutes_per_game,
        updated_at = excluded.updated_at
"#;

#[derive(Debug, Clone, Copy)]
enum ReferenceTable {
    Players,
    Teams,
}

impl ReferenceTable {
    fn name(&self) -> &'static str {
        match self {
            ReferenceTable::Players => "players",
            ReferenceTable::Teams => "teams",
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatRow {
    tournament_id: String,
    player_id: String,
    team_id: String,
    group_name: String,
    birth_year: i32,
    games: i32,
    goals: i32,
    assists: i32,
    points: i32,
    plus: i32,
    minus: i32,
    plus_minus: i32,
    penalty_minutes: i32,
    even_strength_goals: i32,
    power_play_goals: i32,
    short_handed_goals: i32,
    overtime_goals: i32,
    hat_tricks: i32,
    game_winning_goals: i32,
    goals_per_game: f64,
    points_per_game: f64,
    penalty_minutes_per_game: f64,
}

impl From<StatRow> for PlayerStatistic {
    fn from(row: StatRow) -> Self {
        Self {
            tournament_id: row.tournament_id,
            player_id: row.player_id,
            team_id: row.team_id,
            group_name: row.group_name,
            birth_year: row.birth_year,
            games: row.games,
            goals: row.goals,
            assists: row.assists,
            points: row.points,
            plus: row.plus,
            minus: row.minus,
            plus_minus: row.plus_minus,
            penalty_minutes: row.penalty_minutes,
            even_strength_goals: row.even_strength_goals,
            power_play_goals: row.power_play_goals,
            short_handed_goals: row.short_handed_goals,
            overtime_goals: row.overtime_goals,
            hat_tricks: row.hat_tricks,
            game_winning_goals: row.game_winning_goals,
            goals_per_game: row.goals_per_game,
            points_per_game: row.points_per_game,
            penalty_minutes_per_game: row.penalty_minutes_per_game,
        }
    }
}

fn upsert_query<'q>(
    stat: &'q PlayerStatistic,
    now: DateTime<Utc>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(UPSERT_SQL)
        .bind(stat.tournament_id.as_str())
        .bind(stat.player_id.as_str())
        .bind(stat.team_id.as_str())
        .bind(stat.group_name.as_str())
        .bind(stat.birth_year)
        .bind(stat.games)
        .bind(stat.goals)
        .bind(stat.assists)
        .bind(stat.points)
        .bind(stat.plus)
        .bind(stat.minus)
        .bind(stat.plus_minus)
        .bind(stat.penalty_minutes)
        .bind(stat.even_strength_goals)
        .bind(stat.power_play_goals)
        .bind(stat.short_handed_goals)
        .bind(stat.overtime_goals)
        .bind(stat.hat_tricks)
        .bind(stat.game_winning_goals)
        .bind(stat.goals_per_game)
        .bind(stat.points_per_game)
        .bind(stat.penalty_minutes_per_game)
        .bind(now)
}

/// 同一批次內重複的自然鍵 (tournament, player, group, birth year) 數量
fn duplicate_natural_keys(stats: &[&PlayerStatistic]) -> usize {
    let mut seen = HashSet::with_capacity(stats.len());
    stats
        .iter()
        .filter(|s| {
            !seen.insert((
                s.tournament_id.as_str(),
                s.player_id.as_str(),
                s.group_name.as_str(),
                s.birth_year,
            ))
        })
        .count()
}

/// 觸發器訊息轉成 ForeignKeyMiss，其他錯誤原樣回傳
fn reference_error(stat: &PlayerStatistic, error: sqlx::Error) -> EtlError {
    let message = match &error {
        sqlx::Error::Database(db) => db.message().to_string(),
        _ => return EtlError::DatabaseError(error),
    };

    if message.contains(MISSING_TEAM) {
        EtlError::ForeignKeyMiss {
            entity: "team".to_string(),
            id: stat.team_id.clone(),
        }
    } else if message.contains(MISSING_PLAYER) {
        EtlError::ForeignKeyMiss {
            entity: "player".to_string(),
            id: stat.player_id.clone(),
        }
    } else {
        EtlError::DatabaseError(error)
    }
}

/// 球員統計的 sqlx/SQLite 存取層
#[derive(Debug, Clone)]
pub struct SqliteStatsRepository {
    pool: SqlitePool,
}

impl SqliteStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 連線並開啟外鍵檢查；`init_schema` 為 true 時建立資料表
    pub async fn connect(database_url: &str, init_schema: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        if init_schema {
            create_tables(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// In-memory database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // 單一連線，否則每條連線各自是一個空資料庫
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        create_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find_by_tournament(&self, tournament_id: &str) -> Result<Vec<PlayerStatistic>> {
        let rows = sqlx::query_as::<_, StatRow>(
            r#"
            SELECT tournament_id, player_id, team_id, group_name, birth_year,
                   games, goals, assists, points, plus, minus, plus_minus, penalty_minutes,
                   even_strength_goals, power_play_goals, short_handed_goals, overtime_goals,
                   hat_tricks, game_winning_goals, goals_per_game, points_per_game,
                   penalty_minutes_per_game
            FROM player_statistics
            WHERE tournament_id = ?1
            ORDER BY player_id, group_name, birth_year
            "#,
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PlayerStatistic::from).collect())
    }

    pub async fn count_by_tournament(&self, tournament_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM player_statistics WHERE tournament_id = ?1")
            .bind(tournament_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 每種參照表只查一次
    async fn existing_ids(&self, table: ReferenceTable, ids: &BTreeSet<&str>) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT id FROM {} WHERE id IN (", table.name()));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let found: Vec<String> = builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(found.into_iter().collect())
    }
}

#[async_trait]
impl StatsRepository for SqliteStatsRepository {
    async fn delete_by_tournament(&self, tournament_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM player_statistics WHERE tournament_id = ?1")
            .bind(tournament_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_batch(&self, stats: &[PlayerStatistic]) -> Result<BatchInsert> {
        if stats.is_empty() {
            return Ok(BatchInsert::default());
        }

        let player_ids: BTreeSet<&str> = stats.iter().map(|s| s.player_id.as_str()).collect();
        let team_ids: BTreeSet<&str> = stats.iter().map(|s| s.team_id.as_str()).collect();
        let known_players = self.existing_ids(ReferenceTable::Players, &player_ids).await?;
        let known_teams = self.existing_ids(ReferenceTable::Teams, &team_ids).await?;

        let mut insertable = Vec::with_capacity(stats.len());
        let mut skipped = Vec::new();
        for stat in stats {
            if !known_players.contains(&stat.player_id) {
                skipped.push((stat.clone(), MissingReference::Player));
            } else if !known_teams.contains(&stat.team_id) {
                skipped.push((stat.clone(), MissingReference::Team));
            } else {
                insertable.push(stat);
            }
        }

        if !skipped.is_empty() {
            tracing::debug!(
                "🗄️ Pre-filter dropped {} of {} rows with unknown player/team",
                skipped.len(),
                stats.len()
            );
        }

        if insertable.is_empty() {
            return Ok(BatchInsert {
                affected: 0,
                skipped,
            });
        }

        // 後寫入的會覆蓋先前的同鍵資料
        let duplicates = duplicate_natural_keys(&insertable);
        if duplicates > 0 {
            tracing::warn!(
                "⚠️ Batch holds {} rows sharing a natural key with an earlier row; later rows overwrite earlier ones",
                duplicates
            );
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for stat in insertable {
            match upsert_query(stat, now).execute(&mut *tx).await {
                Ok(result) => affected += result.rows_affected(),
                Err(e) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        tracing::error!("🗄️ Rollback failed: {}", rollback_error);
                    }
                    return Err(EtlError::PersistenceTransactionFailure {
                        message: format!(
                            "player {} / team {}: {}",
                            stat.player_id, stat.team_id, e
                        ),
                    });
                }
            }
        }

        tx.commit().await?;
        tracing::debug!("🗄️ Upserted {} rows", affected);

        Ok(BatchInsert { affected, skipped })
    }

    async fn create(&self, stat: &PlayerStatistic) -> Result<()> {
        upsert_query(stat, Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| reference_error(stat, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_repository() -> SqliteStatsRepository {
        let repo = SqliteStatsRepository::in_memory().await.unwrap();
        sqlx::query("INSERT INTO tournaments (id, name) VALUES ('55', 'Первенство')")
            .execute(repo.pool())
            .await
            .unwrap();
        for id in ["1", "2", "3"] {
            sqlx::query("INSERT INTO players (id) VALUES (?1)")
                .bind(id)
                .execute(repo.pool())
                .await
                .unwrap();
        }
        sqlx::query("INSERT INTO teams (id) VALUES ('10')")
            .execute(repo.pool())
            .await
            .unwrap();
        repo
    }

    fn stat(player_id: &str, team_id: &str, goals: i32) -> PlayerStatistic {
        PlayerStatistic {
            tournament_id: "55".to_string(),
            player_id: player_id.to_string(),
            team_id: team_id.to_string(),
            group_name: "Группа А".to_string(),
            birth_year: 2009,
            games: 10,
            goals,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_batch_prefilters_unknown_references() {
        let repo = seeded_repository().await;
        let stats = vec![stat("1", "10", 3), stat("2", "10", 1), stat("9", "10", 0), stat("3", "99", 2)];

        let result = repo.create_batch(&stats).await.unwrap();

        assert_eq!(result.affected, 2);
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.skipped[0].1, MissingReference::Player);
        assert_eq!(result.skipped[1].1, MissingReference::Team);
        assert_eq!(repo.count_by_tournament("55").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_row_rolls_back_whole_batch() {
        let repo = seeded_repository().await;
        let orphan = PlayerStatistic {
            tournament_id: "777".to_string(),
            ..stat("2", "10", 1)
        };

        let result = repo.create_batch(&[stat("1", "10", 3), orphan]).await;

        assert!(matches!(
            result,
            Err(EtlError::PersistenceTransactionFailure { .. })
        ));
        assert_eq!(repo.count_by_tournament("55").await.unwrap(), 0);
        assert_eq!(repo.count_by_tournament("777").await.unwrap(), 0);
    }

    #[test]
    fn test_duplicate_natural_keys() {
        let first = stat("1", "10", 3);
        let same_key = stat("1", "10", 5);
        let other_year = PlayerStatistic {
            birth_year: 2010,
            ..stat("1", "10", 1)
        };
        let other_player = stat("2", "10", 0);

        assert_eq!(duplicate_natural_keys(&[&first, &other_year, &other_player]), 0);
        assert_eq!(duplicate_natural_keys(&[&first, &same_key, &other_year]), 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_on_natural_key() {
        let repo = seeded_repository().await;
        repo.create_batch(&[stat("1", "10", 3)]).await.unwrap();
        let second = repo.create_batch(&[stat("1", "10", 7)]).await.unwrap();

        assert_eq!(second.affected, 1);
        let stored = repo.find_by_tournament("55").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].goals, 7);
    }

    #[tokio::test]
    async fn test_single_create_reports_missing_team() {
        let repo = seeded_repository().await;

        let err = repo.create(&stat("1", "99", 0)).await.unwrap_err();
        assert!(matches!(err, EtlError::ForeignKeyMiss { ref entity, ref id } if entity == "team" && id == "99"));
        assert!(err.to_string().contains("team"));

        let err = repo.create(&stat("9", "10", 0)).await.unwrap_err();
        assert!(matches!(err, EtlError::ForeignKeyMiss { ref entity, .. } if entity == "player"));
        assert!(!err.to_string().contains("team"));
    }

    #[tokio::test]
    async fn test_delete_by_tournament() {
        let repo = seeded_repository().await;
        repo.create_batch(&[stat("1", "10", 3), stat("2", "10", 1)]).await.unwrap();

        assert_eq!(repo.delete_by_tournament("55").await.unwrap(), 2);
        assert_eq!(repo.count_by_tournament("55").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let repo = seeded_repository().await;
        assert_eq!(repo.create_batch(&[]).await.unwrap(), BatchInsert::default());
    }
}
