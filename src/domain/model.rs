use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_non_negative, validate_range};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 不分組（整體統計）的保留 group id，絕不能當作 query 參數送出
pub const ALL_GROUPS: &str = "all";

/// 沒有分組時使用的組名
pub const AGGREGATE_GROUP_NAME: &str = "Общая статистика";

/// 合成年份標籤的前綴，例如 `Год_1794`
pub const PLACEHOLDER_YEAR_PREFIX: &str = "Год_";

pub const MIN_BIRTH_YEAR: i32 = 2000;
pub const MAX_BIRTH_YEAR: i32 = 2020;

/// 一個 (year, group) 抓取單位
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Slice {
    pub year_id: String,
    pub year_label: String,
    pub group_id: String,
    pub group_name: String,
}

impl Slice {
    pub fn new(
        year_id: impl Into<String>,
        year_label: impl Into<String>,
        group_id: impl Into<String>,
        group_name: impl Into<String>,
    ) -> Self {
        Self {
            year_id: year_id.into(),
            year_label: year_label.into(),
            group_id: group_id.into(),
            group_name: group_name.into(),
        }
    }

    /// 整年度的整體統計 slice
    pub fn aggregate(year_id: impl Into<String>, year_label: impl Into<String>) -> Self {
        Self::new(year_id, year_label, ALL_GROUPS, AGGREGATE_GROUP_NAME)
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.year_id, &self.group_id)
    }

    pub fn is_aggregate(&self) -> bool {
        self.group_id.is_empty() || self.group_id == ALL_GROUPS
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) / {} ({})",
            self.year_label, self.year_id, self.group_name, self.group_id
        )
    }
}

pub fn placeholder_year_label(year_id: &str) -> String {
    format!("{}{}", PLACEHOLDER_YEAR_PREFIX, year_id)
}

/// JSON 端點回傳的一列原始資料
///
/// 數值欄位可能是字串、數字或包在 HTML 片段裡，一律先保留為字串。
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawStatRow {
    #[serde(rename = "surname", default, deserialize_with = "loose_string")]
    pub player_html: String,
    #[serde(rename = "team", default, deserialize_with = "loose_string")]
    pub team_html: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub gp: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub g: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub a: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub pts: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub plus: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub minus: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub pm: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub pim: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub esg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub ppg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub shg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub otg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub ht: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub gwg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub g_avg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub pts_avg: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub pim_avg: String,

    // fetch 之後才由所屬 slice 填入
    #[serde(skip)]
    pub group_name: String,
    #[serde(skip)]
    pub year_label: String,
}

impl RawStatRow {
    pub fn tag(mut self, slice: &Slice) -> Self {
        self.group_name = slice.group_name.clone();
        self.year_label = slice.year_label.clone();
        self
    }
}

fn loose_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// JSON 端點的外層結構
#[derive(Debug, Clone, Deserialize)]
pub struct StatsEnvelope {
    pub data: Vec<RawStatRow>,
    #[serde(rename = "recordsTotal", default)]
    pub records_total: Option<u64>,
}

/// 驗證過、可寫入資料庫的球員統計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerStatistic {
    pub tournament_id: String,
    pub player_id: String,
    pub team_id: String,
    pub group_name: String,
    /// 0 代表未知
    pub birth_year: i32,
    pub games: i32,
    pub goals: i32,
    pub assists: i32,
    pub points: i32,
    pub plus: i32,
    pub minus: i32,
    pub plus_minus: i32,
    pub penalty_minutes: i32,
    pub even_strength_goals: i32,
    pub power_play_goals: i32,
    pub short_handed_goals: i32,
    pub overtime_goals: i32,
    pub hat_tricks: i32,
    pub game_winning_goals: i32,
    pub goals_per_game: f64,
    pub points_per_game: f64,
    pub penalty_minutes_per_game: f64,
}

impl PlayerStatistic {
    pub fn counters(&self) -> [(&'static str, i32); 14] {
        [
            ("games", self.games),
            ("goals", self.goals),
            ("assists", self.assists),
            ("points", self.points),
            ("plus", self.plus),
            ("minus", self.minus),
            ("plus_minus", self.plus_minus),
            ("penalty_minutes", self.penalty_minutes),
            ("even_strength_goals", self.even_strength_goals),
            ("power_play_goals", self.power_play_goals),
            ("short_handed_goals", self.short_handed_goals),
            ("overtime_goals", self.overtime_goals),
            ("hat_tricks", self.hat_tricks),
            ("game_winning_goals", self.game_winning_goals),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        validate_non_empty_string("tournament_id", &self.tournament_id)?;
        validate_non_empty_string("player_id", &self.player_id)?;
        validate_non_empty_string("team_id", &self.team_id)?;
        validate_non_empty_string("group_name", &self.group_name)?;

        if self.birth_year != 0 {
            validate_range("birth_year", self.birth_year, MIN_BIRTH_YEAR, MAX_BIRTH_YEAR)?;
        }

        for (name, value) in self.counters() {
            validate_non_negative(name, i64::from(value))?;
        }

        for (name, value) in [
            ("goals_per_game", self.goals_per_game),
            ("points_per_game", self.points_per_game),
            ("penalty_minutes_per_game", self.penalty_minutes_per_game),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(crate::utils::error::EtlError::InvalidValueError {
                    field: name.to_string(),
                    value: value.to_string(),
                    reason: "Ratio must be a finite non-negative number".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn loss(&self, reason: LossReason) -> LossRecord {
        LossRecord {
            player_id: self.player_id.clone(),
            team_id: self.team_id.clone(),
            birth_year: self.birth_year,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    ConversionError,
    ValidationError,
    PlayerNotFound,
    TeamNotFound,
}

impl LossReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossReason::ConversionError => "conversion_error",
            LossReason::ValidationError => "validation_error",
            LossReason::PlayerNotFound => "player_not_found",
            LossReason::TeamNotFound => "team_not_found",
        }
    }
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 沒能成為已儲存統計的一列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LossRecord {
    pub player_id: String,
    pub team_id: String,
    pub birth_year: i32,
    pub reason: LossReason,
}

/// 批次寫入時因參照不存在而被略過的一列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    Player,
    Team,
}

impl MissingReference {
    pub fn loss_reason(&self) -> LossReason {
        match self {
            MissingReference::Player => LossReason::PlayerNotFound,
            MissingReference::Team => LossReason::TeamNotFound,
        }
    }
}

/// 批次寫入結果：實際影響的列數，以及被預先過濾掉的列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchInsert {
    pub affected: u64,
    pub skipped: Vec<(PlayerStatistic, MissingReference)>,
}

/// 一次 tournament 執行的最終結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub tournament_id: String,
    pub slices_discovered: usize,
    pub slices_failed: usize,
    pub received: usize,
    pub saved: usize,
    pub losses: Vec<LossRecord>,
}

impl IngestionReport {
    pub fn new(tournament_id: impl Into<String>) -> Self {
        Self {
            tournament_id: tournament_id.into(),
            ..Default::default()
        }
    }

    pub fn lost(&self) -> usize {
        self.received.saturating_sub(self.saved)
    }

    pub fn lost_percentage(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.lost() as f64 * 100.0 / self.received as f64
        }
    }

    pub fn losses_by_reason(&self) -> BTreeMap<LossReason, usize> {
        let mut counts = BTreeMap::new();
        for loss in &self.losses {
            *counts.entry(loss.reason).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_stat() -> PlayerStatistic {
        PlayerStatistic {
            tournament_id: "10".to_string(),
            player_id: "12345".to_string(),
            team_id: "678".to_string(),
            group_name: "Группа А".to_string(),
            birth_year: 2009,
            games: 10,
            goals: 4,
            assists: 6,
            points: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_statistic_passes() {
        assert!(valid_stat().validate().is_ok());
    }

    #[test]
    fn test_unknown_birth_year_is_allowed() {
        let stat = PlayerStatistic {
            birth_year: 0,
            ..valid_stat()
        };
        assert!(stat.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_birth_year_is_rejected() {
        let stat = PlayerStatistic {
            birth_year: 1999,
            ..valid_stat()
        };
        assert!(stat.validate().is_err());
    }

    #[test]
    fn test_negative_counter_is_rejected() {
        let stat = PlayerStatistic {
            penalty_minutes: -2,
            ..valid_stat()
        };
        assert!(stat.validate().is_err());
    }

    #[test]
    fn test_empty_identifier_is_rejected() {
        let stat = PlayerStatistic {
            team_id: String::new(),
            ..valid_stat()
        };
        assert!(stat.validate().is_err());
    }

    #[test]
    fn test_raw_row_accepts_numbers_and_nulls() {
        let row: RawStatRow = serde_json::from_value(serde_json::json!({
            "surname": "<a href=\"/player/ivanov-ivan-1/\">Иванов</a>",
            "team": null,
            "gp": 12,
            "g_avg": "0,5"
        }))
        .unwrap();

        assert_eq!(row.gp, "12");
        assert_eq!(row.team_html, "");
        assert_eq!(row.g_avg, "0,5");
        assert_eq!(row.pts, "");
    }

    #[test]
    fn test_report_accounting() {
        let mut report = IngestionReport::new("10");
        report.received = 15;
        report.saved = 12;
        report.losses = vec![
            valid_stat().loss(LossReason::ConversionError),
            valid_stat().loss(LossReason::ConversionError),
            valid_stat().loss(LossReason::TeamNotFound),
        ];

        assert_eq!(report.lost(), 3);
        assert!((report.lost_percentage() - 20.0).abs() < f64::EPSILON);
        let by_reason = report.losses_by_reason();
        assert_eq!(by_reason[&LossReason::ConversionError], 2);
        assert_eq!(by_reason[&LossReason::TeamNotFound], 1);
    }

    #[test]
    fn test_slice_aggregate() {
        let slice = Slice::aggregate("1794", "2009");
        assert!(slice.is_aggregate());
        assert_eq!(slice.group_name, AGGREGATE_GROUP_NAME);
        assert_eq!(placeholder_year_label("1794"), "Год_1794");
    }
}
