use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

use archive_crawler::base_system::config::load_or_create;
use archive_crawler::base_system::context::Config;
use archive_crawler::base_system::interrupt::{self, InterruptFlag};
use archive_crawler::base_system::logging::{LogOptions, LogSystem};
use archive_crawler::download::{ArtifactReport, CrawlOptions, CrawlOrchestrator};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "archive-corpus-crawler")]
#[command(about = "Resumable archive catalog crawler")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 crawler.yml、完成记录、下载文件和 logs）
    #[arg(long)]
    data_dir: Option<String>,

    /// 指定配置文件路径
    #[arg(long)]
    config: Option<String>,

    /// 只判定与展开，不下载、不写完成记录
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// 本次最多处理的目录条目数
    #[arg(long)]
    max_entries: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Archive Corpus Crawler v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);
    info!(target: "startup", "日志目录: {}", log.logs_dir().display());

    let config = load_or_create::<Config>(cli.config.as_deref().map(Path::new), data_dir)
        .map_err(|e| anyhow!(e.to_string()))?
        .with_base_dir(data_dir);

    let stop = match interrupt::install() {
        Ok(flag) => flag,
        Err(err) => {
            warn!(target: "startup", "无法注册 Ctrl-C 处理: {err}");
            InterruptFlag::new()
        }
    };

    let options = CrawlOptions {
        dry_run: cli.dry_run,
        max_entries: cli.max_entries,
        ..CrawlOptions::from_config(&config)
    };
    let mut orchestrator = CrawlOrchestrator::from_config(&config, stop, options)?;
    let summary = orchestrator.run();
    orchestrator.shutdown();

    let root = orchestrator.download_root().to_path_buf();
    ArtifactReport::scan(&root, &config.artifact_extension).log(&root);
    if summary.interrupted {
        warn!(target: "startup", "运行被中断，未完成的条目将在下次运行时重试");
    }
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        ..LogOptions::default()
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}
