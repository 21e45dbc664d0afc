//! Quantify 일봉 데이터 수집기 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # API 키 저장
//! quantify-collector set-keys --key-id PK... --secret-key ...
//!
//! # 종목 목록 갱신 후 기본 바스켓 조회
//! quantify-collector refresh-assets
//! quantify-collector get-data --start 2024-01-02 --end 2024-06-28
//!
//! # 특정 종목을 CSV로 출력
//! quantify-collector get-data -s AAPL,MSFT --start 2024-01-02 --end 2024-01-31 --format csv
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use quantify_collector::modules::{self, GetDataOptions, OutputFormat};
use quantify_collector::{CollectorContext, ConfigFile};
use quantify_core::{default_config_path, init_logging, AppConfig, LogConfig, Symbol};
use quantify_data::run_migrations;
use secrecy::SecretString;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quantify-collector")]
#[command(about = "Quantify daily bar collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (기본: $QUANTIFY_CONFIG 또는 config/quantify.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (설정 파일 값보다 우선)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 일봉 조회 (누락 구간만 원격 조회 후 저장)
    GetData {
        /// 종목 (쉼표로 구분, 생략 시 기본 바스켓)
        #[arg(short, long)]
        symbols: Option<String>,

        /// 시작 날짜 (YYYY-MM-DD, 생략 시 종료 날짜)
        #[arg(long)]
        start: Option<String>,

        /// 종료 날짜 (YYYY-MM-DD, 생략 시 직전 거래일)
        #[arg(long)]
        end: Option<String>,

        /// 거래소 캘린더 (예: NYSE, NASDAQ)
        #[arg(long)]
        exchange: Option<String>,

        /// 허용 누락 거래일 수
        #[arg(long)]
        tolerance: Option<usize>,

        /// 원격 조회 없이 저장된 데이터만 사용
        #[arg(long)]
        no_download: bool,

        /// 출력 형식
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// 출력 파일 (생략 시 표준 출력)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 종목 목록 갱신
    RefreshAssets,

    /// 기본 바스켓을 최근 기간으로 동기화
    Sync,

    /// 데몬 모드: 주기적으로 종목 갱신 + 동기화
    Daemon,

    /// 데이터베이스 마이그레이션 실행
    Migrate,

    /// Alpaca API 키 저장
    SetKeys {
        #[arg(long, env = "APCA_API_KEY_ID", hide_env_values = true)]
        key_id: String,

        #[arg(long, env = "APCA_API_SECRET_KEY", hide_env_values = true)]
        secret_key: String,

        /// 기존 키 덮어쓰기
        #[arg(long)]
        force: bool,
    },

    /// 원격 조회 기본값 변경
    SetDownload {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// 설정 파일을 기본값으로 초기화 (API 키 삭제)
    ResetConfig {
        /// 확인 없이 실행
        #[arg(long)]
        yes: bool,
    },

    /// 설정 파일 출력 (비밀 값 가림)
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("설정 로드 실패: {}", config_path.display()))?;

    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!(e))?;

    let file = ConfigFile::new(&config_path);

    match &cli.command {
        Commands::SetKeys {
            key_id,
            secret_key,
            force,
        } => {
            file.set_keys(
                &SecretString::from(key_id.clone()),
                &SecretString::from(secret_key.clone()),
                *force,
            )?;
            println!("API keys saved to {}", file.path().display());
            return Ok(());
        }
        Commands::SetDownload { state } => {
            let enabled = matches!(state, Toggle::On);
            file.set_download(enabled)?;
            println!("download = {} ({})", enabled, file.path().display());
            return Ok(());
        }
        Commands::ResetConfig { yes } => {
            if !*yes {
                anyhow::bail!("reset-config deletes stored API keys; re-run with --yes");
            }
            file.reset()?;
            println!("{} reset to defaults", file.path().display());
            return Ok(());
        }
        Commands::ShowConfig => {
            match file.redacted()? {
                Some(content) => print!("{}", content),
                None => println!("# {} does not exist (defaults in use)", file.path().display()),
            }
            return Ok(());
        }
        _ => {}
    }

    tracing::info!("Quantify Collector 시작");
    let ctx = CollectorContext::connect(config).await?;

    match cli.command {
        Commands::Migrate => {
            run_migrations(&ctx.pool).await?;
        }
        Commands::GetData {
            symbols,
            start,
            end,
            exchange,
            tolerance,
            no_download,
            format,
            output,
        } => {
            let options = GetDataOptions {
                symbols: symbols.as_deref().map(Symbol::parse_list).unwrap_or_default(),
                start: start.as_deref().map(modules::parse_date).transpose()?,
                end: end.as_deref().map(modules::parse_date).transpose()?,
                exchange,
                tolerance,
                download: no_download.then_some(false),
            };
            let today = chrono::Local::now().date_naive();
            let (result, stats) =
                modules::get_data(&ctx.facade, ctx.assets.as_ref(), &ctx.config, options, today)
                    .await?;

            match output {
                Some(path) => {
                    let mut writer = std::io::BufWriter::new(
                        std::fs::File::create(&path)
                            .with_context(|| format!("출력 파일 생성 실패: {}", path.display()))?,
                    );
                    modules::render(&result, format, &mut writer)?;
                    writer.flush()?;
                    tracing::info!(path = %path.display(), "결과 저장 완료");
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    modules::render(&result, format, &mut lock)?;
                }
            }
            stats.log_summary("일봉 조회");
        }
        Commands::RefreshAssets => {
            let stats = modules::refresh_assets(&ctx.refresher).await?;
            stats.log_summary("종목 목록 갱신");
        }
        Commands::Sync => {
            let today = chrono::Local::now().date_naive();
            let stats =
                modules::sync_basket(&ctx.facade, ctx.assets.as_ref(), &ctx.config, today).await?;
            stats.log_summary("바스켓 동기화");
        }
        Commands::Daemon => {
            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분) ===",
                ctx.config.daemon.interval_minutes
            );

            let mut interval = tokio::time::interval(ctx.config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        tracing::info!("=== 동기화 실행 시작 ===");

                        // 1. 종목 목록 갱신
                        match modules::refresh_assets(&ctx.refresher).await {
                            Ok(stats) => stats.log_summary("종목 목록 갱신"),
                            Err(e) => tracing::error!("종목 목록 갱신 실패: {}", e),
                        }

                        // 2. 바스켓 동기화
                        let today = chrono::Local::now().date_naive();
                        match modules::sync_basket(&ctx.facade, ctx.assets.as_ref(), &ctx.config, today).await {
                            Ok(stats) => stats.log_summary("바스켓 동기화"),
                            Err(e) => tracing::error!("바스켓 동기화 실패: {}", e),
                        }

                        tracing::info!(
                            "=== 동기화 완료, 다음 실행: {}분 후 ===",
                            ctx.config.daemon.interval_minutes
                        );
                    }
                }
            }
        }
        Commands::SetKeys { .. }
        | Commands::SetDownload { .. }
        | Commands::ResetConfig { .. }
        | Commands::ShowConfig => {}
    }

    ctx.close().await;
    tracing::info!("Quantify Collector 종료");

    Ok(())
}
