//! 日志：控制台 + `logs/latest.log`，退出时把本次日志压缩归档。
//!
//! 爬虫自身的 target（见 [`CRAWL_TARGETS`]）在文件中始终记录 DEBUG；
//! 浏览器驱动和 HTTP 栈只记录 WARN 以上。

use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const DRAIN_WAIT: Duration = Duration::from_millis(300);

pub const CRAWL_TARGETS: [&str; 14] = [
    "startup",
    "config",
    "crawl",
    "catalog",
    "classify",
    "resolve",
    "download",
    "browser",
    "ledger",
    "network",
    "report",
    "retry",
    "archive_crawler",
    "archive_corpus_crawler",
];
const NOISY_TARGETS: [&str; 4] = ["chromiumoxide", "tungstenite", "hyper", "reqwest"];

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// 控制台输出 DEBUG。
    pub debug: bool,
    pub archive_on_exit: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            archive_on_exit: true,
        }
    }
}

/// 控制台过滤：爬虫 target 按 `debug` 决定级别，其它一律 WARN。
pub fn console_filter(debug: bool) -> Targets {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    CRAWL_TARGETS
        .iter()
        .fold(Targets::new(), |t, target| t.with_target(*target, level))
        .with_default(LevelFilter::WARN)
}

/// 文件过滤：爬虫 target 记录 DEBUG，浏览器 / HTTP 栈只记录 WARN。
pub fn file_filter() -> Targets {
    NOISY_TARGETS
        .iter()
        .fold(Targets::new(), |t, target| t.with_target(*target, LevelFilter::WARN))
        .with_default(LevelFilter::DEBUG)
}

pub struct LogSystem {
    runtime: Arc<LogRuntime>,
}

impl LogSystem {
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = base_dir
            .map(|b| b.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join("latest.log");

        // 上次异常退出可能留下过大的日志
        archive_if_large(&latest_log, &logs_dir)?;

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&logs_dir, "latest.log"));

        let console_layer = fmt::layer()
            .with_target(false)
            .with_ansi(io::stdout().is_terminal())
            .with_writer(io::stdout)
            .with_filter(console_filter(options.debug));

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(file_filter());

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        let runtime = Arc::new(LogRuntime {
            logs_dir,
            latest_log,
            guard: Mutex::new(Some(guard)),
            finished: AtomicBool::new(false),
            archive_on_exit: options.archive_on_exit,
        });
        runtime.install_panic_hook();

        Ok(Self { runtime })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.runtime.logs_dir
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.runtime.finish();
    }
}

struct LogRuntime {
    logs_dir: PathBuf,
    latest_log: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    finished: AtomicBool,
    archive_on_exit: bool,
}

impl LogRuntime {
    fn install_panic_hook(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            match info.location() {
                Some(at) => error!(target: "crawl", "panic at {}:{}: {info}", at.file(), at.line()),
                None => error!(target: "crawl", "panic: {info}"),
            }
            runtime.finish();
            previous(info);
        }));
    }

    /// 刷新写入线程并归档，只执行一次。
    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        if self.archive_on_exit {
            thread::sleep(DRAIN_WAIT);
            if let Err(err) = archive_log_file(&self.latest_log, &self.logs_dir) {
                eprintln!("日志归档失败: {err}");
            }
        }
    }
}

fn archive_if_large(latest_log: &Path, logs_dir: &Path) -> Result<(), LogError> {
    if let Ok(meta) = fs::metadata(latest_log)
        && meta.len() >= MAX_LOG_BYTES
    {
        archive_log_file(latest_log, logs_dir)?;
    }
    Ok(())
}

/// 同一秒内多次归档时追加序号，避免覆盖。
fn archive_path(logs_dir: &Path, timestamp: &str) -> PathBuf {
    let first = logs_dir.join(format!("crawl_{timestamp}.zip"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| logs_dir.join(format!("crawl_{timestamp}_{n}.zip")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let size = match fs::metadata(latest_log) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let timestamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let path = archive_path(logs_dir, &timestamp);

    let mut zip = zip::ZipWriter::new(File::create(&path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(format!("crawl_{timestamp}.log"), options)?;
    io::copy(&mut File::open(latest_log)?, &mut zip)?;
    zip.finish()?;

    let _ = fs::remove_file(latest_log);
    info!(target: "startup", "日志已归档: {}", path.display());
    Ok(Some(path))
}
