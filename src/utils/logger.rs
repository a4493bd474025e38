use crate::domain::model::{IngestionReport, LossRecord, Slice};
use crate::domain::ports::IngestionReporter;
use crate::utils::error::EtlError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "hockey_stats_etl";

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose {
        format!("{}=debug,info", CRATE_TARGET)
    } else {
        format!("{}=info,warn", CRATE_TARGET)
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// JSON 格式，給 log 收集工具使用
pub fn init_json_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}

/// 把執行事件寫成結構化的 tracing 事件
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl IngestionReporter for TracingReporter {
    fn run_started(&self, tournament_id: &str, url: &str) {
        tracing::info!(tournament_id, url, "🚀 Parsing tournament statistics");
    }

    fn slices_discovered(&self, tournament_id: &str, slices: &[Slice]) {
        tracing::info!(
            tournament_id,
            slices = slices.len(),
            "🔎 Discovered {} year/group slices",
            slices.len()
        );
    }

    fn slice_started(&self, slice: &Slice) {
        tracing::debug!(
            year_id = %slice.year_id,
            group_id = %slice.group_id,
            "📡 Fetching {}",
            slice
        );
    }

    fn slice_finished(&self, slice: &Slice, rows: usize) {
        tracing::info!(
            year_id = %slice.year_id,
            group_id = %slice.group_id,
            rows,
            "📥 {}: {} rows",
            slice,
            rows
        );
    }

    fn slice_failed(&self, slice: &Slice, error: &EtlError) {
        tracing::warn!(
            year_id = %slice.year_id,
            group_id = %slice.group_id,
            "⚠️ Skipping {}: {}",
            slice,
            error
        );
    }

    fn loss(&self, tournament_id: &str, loss: &LossRecord) {
        tracing::debug!(
            tournament_id,
            player_id = %loss.player_id,
            team_id = %loss.team_id,
            birth_year = loss.birth_year,
            reason = %loss.reason,
            "🕳️ Row lost"
        );
    }

    fn summary(&self, report: &IngestionReport) {
        tracing::info!(
            tournament_id = %report.tournament_id,
            received = report.received,
            saved = report.saved,
            lost = report.lost(),
            lost_percentage = report.lost_percentage(),
            slices = report.slices_discovered,
            slices_failed = report.slices_failed,
            "📊 Received {}, saved {}, lost {} ({:.1}%)",
            report.received,
            report.saved,
            report.lost(),
            report.lost_percentage()
        );

        for (reason, count) in report.losses_by_reason() {
            tracing::info!(
                tournament_id = %report.tournament_id,
                reason = %reason,
                count,
                "   {}: {}",
                reason,
                count
            );
        }
    }
}
