#![allow(dead_code)]

use hockey_stats_etl::adapters::http::{HttpClient, DEFAULT_STATS_API_PATH};
use hockey_stats_etl::adapters::storage::SqliteStatsRepository;
use hockey_stats_etl::domain::services::params::encode_params;
use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};

pub const TOURNAMENT_ID: &str = "55";
pub const TOURNAMENT_PATH: &str = "/tournaments/pervenstvo-rossii/";
pub const KNOWN_TEAM: &str = "7";
pub const UNKNOWN_TEAM: &str = "99";

pub fn http_client() -> HttpClient {
    HttpClient::new(reqwest::Client::new(), DEFAULT_STATS_API_PATH, "2025-2026")
}

pub fn year_ajax_path(year_id: &str) -> String {
    format!("/local/ajax/competitions-stats/groups/{}/", year_id)
}

pub fn year_option(year_id: &str, label: &str) -> String {
    format!(
        r#"<option value="{}" data-ajax-link="{}">{}</option>"#,
        year_id,
        year_ajax_path(year_id),
        label
    )
}

pub fn tournament_page(options: &[String]) -> String {
    format!(
        r#"<html><body>
            <h1>Первенство России</h1>
            <select class="js-stats-year">{}</select>
        </body></html>"#,
        options.join("")
    )
}

pub fn group_fragment(year_id: &str, groups: &[(&str, &str)]) -> String {
    let buttons: Vec<String> = groups
        .iter()
        .map(|(group_id, name)| {
            format!(
                r#"<a class="btn" data-ajax-link="/local/ajax/competitions-stats/?tab=scorers&amp;params={}">{}</a>"#,
                encode_params(year_id, Some(*group_id)),
                name
            )
        })
        .collect();
    format!(r#"<div class="groups">{}</div>"#, buttons.join(""))
}

pub fn stat_row(player_id: u32, team_id: &str) -> Value {
    json!({
        "surname": format!(r#"<a href="/player/petrov-petr-{}/">Петров Пётр</a>"#, player_id),
        "team": format!(r#"<a href="/tournaments/pervenstvo-rossii/dinamo_{}/">Динамо</a>"#, team_id),
        "gp": "<span>12</span>",
        "g": 4,
        "a": "6",
        "pts": "10",
        "plus": "8",
        "minus": "3",
        "pm": "5",
        "pim": "<span>2</span>",
        "esg": "3",
        "ppg": "1",
        "shg": "0",
        "otg": "0",
        "ht": "0",
        "gwg": "1",
        "g_avg": "0,33",
        "pts_avg": "0,83",
        "pim_avg": "0,17"
    })
}

pub fn row_without_player_link(team_id: &str) -> Value {
    let mut row = stat_row(0, team_id);
    row["surname"] = json!("Сидоров Сидор");
    row
}

/// 頁面 + 一個年份 (2009)，兩個分組：第一組 10 列、第二組 5 列
/// 共 2 列缺 player 連結、1 列 team 不存在
pub fn mount_scenario(server: &MockServer) -> Vec<Mock<'_>> {
    let page = server.mock(|when, then| {
        when.method(GET).path(TOURNAMENT_PATH);
        then.status(200)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(tournament_page(&[year_option("1794", "2009")]));
    });

    let groups = server.mock(|when, then| {
        when.method(GET).path(year_ajax_path("1794"));
        then.status(200)
            .body(group_fragment("1794", &[("11", "Группа А"), ("12", "Группа Б")]));
    });

    let mut first: Vec<Value> = (1..=9).map(|id| stat_row(id, KNOWN_TEAM)).collect();
    first.push(row_without_player_link(KNOWN_TEAM));

    let second = vec![
        stat_row(10, KNOWN_TEAM),
        stat_row(11, KNOWN_TEAM),
        stat_row(12, KNOWN_TEAM),
        stat_row(13, UNKNOWN_TEAM),
        row_without_player_link(KNOWN_TEAM),
    ];

    let first_slice = server.mock(|when, then| {
        when.method(GET)
            .path(DEFAULT_STATS_API_PATH)
            .query_param("key", "scorers")
            .query_param("comp", TOURNAMENT_ID)
            .query_param("year", "1794")
            .query_param("group", "11");
        then.status(200)
            .json_body(json!({"recordsTotal": 10, "data": first}));
    });

    let second_slice = server.mock(|when, then| {
        when.method(GET)
            .path(DEFAULT_STATS_API_PATH)
            .query_param("comp", TOURNAMENT_ID)
            .query_param("group", "12");
        then.status(200)
            .json_body(json!({"recordsTotal": 5, "data": second}));
    });

    vec![page, groups, first_slice, second_slice]
}

/// 建立參照資料：tournament 55、player 1..=20、team 7
pub async fn seeded_repository() -> SqliteStatsRepository {
    let repo = SqliteStatsRepository::in_memory().await.unwrap();
    sqlx::query("INSERT INTO tournaments (id, name) VALUES (?1, 'Первенство России')")
        .bind(TOURNAMENT_ID)
        .execute(repo.pool())
        .await
        .unwrap();
    for id in 1..=20 {
        sqlx::query("INSERT INTO players (id) VALUES (?1)")
            .bind(id.to_string())
            .execute(repo.pool())
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO teams (id, name) VALUES (?1, 'Динамо')")
        .bind(KNOWN_TEAM)
        .execute(repo.pool())
        .await
        .unwrap();
    repo
}
