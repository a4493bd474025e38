use crate::utils::error::Result;
use sqlx::SqlitePool;

/// 觸發器的錯誤訊息，用來分辨缺少的是 player 還是 team
pub const MISSING_PLAYER: &str = "player_id references a missing player";
pub const MISSING_TEAM: &str = "team_id references a missing team";

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tournaments (
        id TEXT PRIMARY KEY,
        name TEXT,
        created_at TEXT DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        full_name TEXT,
        created_at TEXT DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        id TEXT PRIMARY KEY,
        name TEXT,
        created_at TEXT DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_statistics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tournament_id TEXT NOT NULL REFERENCES tournaments(id),
        player_id TEXT NOT NULL REFERENCES players(id),
        team_id TEXT NOT NULL REFERENCES teams(id),
        group_name TEXT NOT NULL,
        birth_year INTEGER NOT NULL DEFAULT 0,
        games INTEGER NOT NULL DEFAULT 0,
        goals INTEGER NOT NULL DEFAULT 0,
        assists INTEGER NOT NULL DEFAULT 0,
        points INTEGER NOT NULL DEFAULT 0,
        plus INTEGER NOT NULL DEFAULT 0,
        minus INTEGER NOT NULL DEFAULT 0,
        plus_minus INTEGER NOT NULL DEFAULT 0,
        penalty_minutes INTEGER NOT NULL DEFAULT 0,
        even_strength_goals INTEGER NOT NULL DEFAULT 0,
        power_play_goals INTEGER NOT NULL DEFAULT 0,
        short_handed_goals INTEGER NOT NULL DEFAULT 0,
        overtime_goals INTEGER NOT NULL DEFAULT 0,
        hat_tricks INTEGER NOT NULL DEFAULT 0,
        game_winning_goals INTEGER NOT NULL DEFAULT 0,
        goals_per_game REAL NOT NULL DEFAULT 0,
        points_per_game REAL NOT NULL DEFAULT 0,
        penalty_minutes_per_game REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(tournament_id, player_id, group_name, birth_year)
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS player_statistics_player_exists
    BEFORE INSERT ON player_statistics
    WHEN NOT EXISTS (SELECT 1 FROM players WHERE id = NEW.player_id)
    BEGIN
        SELECT RAISE(ABORT, 'player_id references a missing player');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS player_statistics_team_exists
    BEFORE INSERT ON player_statistics
    WHEN NOT EXISTS (SELECT 1 FROM teams WHERE id = NEW.team_id)
    BEGIN
        SELECT RAISE(ABORT, 'team_id references a missing team');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS player_statistics_team_update_exists
    BEFORE UPDATE OF team_id ON player_statistics
    WHEN NOT EXISTS (SELECT 1 FROM teams WHERE id = NEW.team_id)
    BEGIN
        SELECT RAISE(ABORT, 'team_id references a missing team');
    END
    "#,
    "CREATE INDEX IF NOT EXISTS idx_player_statistics_tournament ON player_statistics(tournament_id)",
];

/// 建立本地執行與測試用的資料表；tournaments、players、teams 為參照資料，
/// player_statistics 每個 (tournament, player, group, birth year) 一列
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
