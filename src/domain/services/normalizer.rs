use crate::core::fallback::{classify_all, Classified};
use crate::domain::model::{
    LossReason, LossRecord, PlayerStatistic, RawStatRow, MAX_BIRTH_YEAR, MIN_BIRTH_YEAR,
    PLACEHOLDER_YEAR_PREFIX,
};
use crate::utils::error::{EtlError, Result};
use regex::Regex;
use std::sync::LazyLock;

static PLAYER_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/player/[^/]*?-(\d+)/").expect("valid player regex"));

static TEAM_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/tournaments/[^/]+/[^/]*?_(\d+)/").expect("valid team regex")
});

static MARKUP_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">([^<>]*)<").expect("valid markup regex"));

pub fn extract_player_id(html: &str) -> Option<String> {
    PLAYER_HREF.captures(html).map(|caps| caps[1].to_string())
}

pub fn extract_team_id(html: &str) -> Option<String> {
    TEAM_HREF.captures(html).map(|caps| caps[1].to_string())
}

/// 空字串、合成標籤、無法解析或超出範圍都視為未知 (0)
pub fn parse_birth_year(label: &str) -> i32 {
    let label = label.trim();
    if label.is_empty() || label.starts_with(PLACEHOLDER_YEAR_PREFIX) {
        return 0;
    }

    match label.parse::<i32>() {
        Ok(year) if (MIN_BIRTH_YEAR..=MAX_BIRTH_YEAR).contains(&year) => year,
        _ => 0,
    }
}

/// 取出 `>value<` 中的值；沒有 markup 時使用原字串
fn markup_value(raw: &str) -> &str {
    MARKUP_VALUE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| raw.trim())
}

pub fn parse_int(raw: &str) -> i32 {
    markup_value(raw).replace(char::is_whitespace, "").parse().unwrap_or(0)
}

pub fn parse_float(raw: &str) -> f64 {
    markup_value(raw)
        .replace(char::is_whitespace, "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// 單列轉換；識別碼缺失為 ExtractionFailure，實體驗證失敗為 ValidationError
pub fn normalize_row(tournament_id: &str, row: &RawStatRow) -> Result<PlayerStatistic> {
    let player_id = extract_player_id(&row.player_html).ok_or_else(|| EtlError::ExtractionFailure {
        message: format!("no player id in '{}'", row.player_html),
    })?;
    let team_id = extract_team_id(&row.team_html).ok_or_else(|| EtlError::ExtractionFailure {
        message: format!("no team id in '{}'", row.team_html),
    })?;

    let stat = PlayerStatistic {
        tournament_id: tournament_id.to_string(),
        player_id,
        team_id,
        group_name: row.group_name.clone(),
        birth_year: parse_birth_year(&row.year_label),
        games: parse_int(&row.gp),
        goals: parse_int(&row.g),
        assists: parse_int(&row.a),
        points: parse_int(&row.pts),
        plus: parse_int(&row.plus),
        minus: parse_int(&row.minus),
        plus_minus: parse_int(&row.pm),
        penalty_minutes: parse_int(&row.pim),
        even_strength_goals: parse_int(&row.esg),
        power_play_goals: parse_int(&row.ppg),
        short_handed_goals: parse_int(&row.shg),
        overtime_goals: parse_int(&row.otg),
        hat_tricks: parse_int(&row.ht),
        game_winning_goals: parse_int(&row.gwg),
        goals_per_game: parse_float(&row.g_avg),
        points_per_game: parse_float(&row.pts_avg),
        penalty_minutes_per_game: parse_float(&row.pim_avg),
    };

    stat.validate().map_err(|e| EtlError::ValidationError {
        message: e.to_string(),
    })?;

    Ok(stat)
}

/// 把原始 JSON 列轉成驗證過的 PlayerStatistic，失敗的列成為 LossRecord
pub fn normalize_rows(
    tournament_id: &str,
    rows: &[RawStatRow],
) -> Classified<PlayerStatistic, LossRecord> {
    classify_all(rows, |row| {
        normalize_row(tournament_id, row).map_err(|e| {
            let reason = match e {
                EtlError::ValidationError { .. } => LossReason::ValidationError,
                _ => LossReason::ConversionError,
            };
            tracing::debug!("🧹 Rejected row ({}): {}", reason, e);
            LossRecord {
                player_id: extract_player_id(&row.player_html).unwrap_or_default(),
                team_id: extract_team_id(&row.team_html).unwrap_or_default(),
                birth_year: parse_birth_year(&row.year_label),
                reason,
            }
        })
    })
}
