use clap::{Parser, Subcommand};
use mediasync::logging::init_logging;
use mediasync::{create_storage, MediaUrls, MediasyncConfig, SyncEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, warn};

#[derive(Parser, Debug)]
#[command(name = "mediasync", version, about = "Sync static media and bundles to remote storage")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "mediasync.json", global = true)]
    config: PathBuf,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 同步媒体文件（默认命令）
    Sync {
        /// 忽略远端指纹，全部重新上传
        #[arg(short, long)]
        force: bool,

        /// 以 JSON 输出同步报告
        #[arg(long)]
        json: bool,
    },
    /// 打印文件或合并目标的访问 URL
    Urls {
        #[arg(required = true)]
        targets: Vec<String>,

        #[arg(long)]
        ssl: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 日志配置在配置文件中，加载失败时只能直接输出
    let config = match MediasyncConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置错误: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_logging(&config.log, cli.verbose);

    let command = cli.command.unwrap_or(Command::Sync {
        force: false,
        json: false,
    });

    match run(command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: MediasyncConfig) -> anyhow::Result<ExitCode> {
    let storage = create_storage(&config)?;

    match command {
        Command::Sync { force, json } => {
            let engine = SyncEngine::new(config, storage)?;

            let cancel = engine.cancel_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("收到中断信号，正在取消同步...");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let report = engine.run(force).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Urls { targets, ssl } => {
            let urls = MediaUrls::new(&config, storage.as_ref());
            let ssl = ssl || config.use_ssl;
            for target in &targets {
                for url in urls.bundle_urls(target, ssl) {
                    println!("{}", url);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
