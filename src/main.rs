use clap::Parser;
use hockey_stats_etl::core::ConfigProvider;
use hockey_stats_etl::utils::error::ErrorSeverity;
use hockey_stats_etl::utils::logger::{self, TracingReporter};
use hockey_stats_etl::utils::validation::Validate;
use hockey_stats_etl::{
    CliConfig, EtlError, HttpClient, IngestionEngine, SqliteStatsRepository, TomlConfig,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Target = (String, String, String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting hockey-stats-etl");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 取消信號
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Ctrl-C received, cancelling");
            ctrl_c.cancel();
        }
    });

    let result = match &config.config {
        Some(path) => match TomlConfig::from_file(path) {
            Ok(file_config) => {
                let targets = file_config
                    .targets()
                    .map(|(domain, path, id)| (domain.to_string(), path.to_string(), id.to_string()))
                    .collect();
                let init_schema = file_config.init_schema() || config.init_schema;
                run(&file_config, init_schema, targets, &cancel).await
            }
            Err(e) => Err(e),
        },
        None => {
            let targets = config
                .tournament()
                .map(|(domain, path, id)| vec![(domain.to_string(), path.to_string(), id.to_string())])
                .unwrap_or_default();
            run(&config, config.init_schema, targets, &cancel).await
        }
    };

    if let Err(e) = result {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

/// 依序處理每個 tournament；回傳最嚴重的錯誤
async fn run<C>(
    config: &C,
    init_schema: bool,
    targets: Vec<Target>,
    cancel: &CancellationToken,
) -> Result<(), EtlError>
where
    C: ConfigProvider + Validate,
{
    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }

    let http = HttpClient::from_config(config)?;
    tracing::info!("📅 Season {}", http.season());
    let repository = SqliteStatsRepository::connect(config.database_url(), init_schema).await?;

    let engine = IngestionEngine::new(
        http.clone(),
        http,
        repository,
        Arc::new(TracingReporter),
    )
    .with_concurrency(config.concurrent_requests());

    let mut worst: Option<EtlError> = None;
    for (domain, path, tournament_id) in targets {
        match engine.run(cancel, &domain, &path, &tournament_id).await {
            Ok(report) => {
                println!(
                    "✅ Tournament {}: received {}, saved {}, lost {}",
                    report.tournament_id,
                    report.received,
                    report.saved,
                    report.lost()
                );
            }
            Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
            Err(e) => {
                tracing::error!("❌ Tournament {} failed: {}", tournament_id, e);
                if worst.as_ref().map_or(true, |w| e.severity() > w.severity()) {
                    worst = Some(e);
                }
            }
        }
    }

    match worst {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
