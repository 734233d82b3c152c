//! 下载流程模块入口。
//!
//! 子模块：
//! - `browser`      — 浏览器能力抽象与会话生命周期（BrowserSession / BrowserSlot）
//! - `chromium`     — chromiumoxide 实现
//! - `downloader`   — 单个详情页的文档下载与校验
//! - `orchestrator` — 条目状态机与爬取主流程
//! - `progress`     — CLI 进度条
//! - `summary`      — 运行汇总与落盘统计

pub mod browser;
pub mod chromium;
pub mod downloader;
pub mod orchestrator;
pub(crate) mod progress;
pub mod summary;

pub use browser::{BrowserDownload, BrowserError, BrowserSession, BrowserSlot, VisibleControl};
pub use downloader::{ArtifactDownloader, DownloadError, DownloaderSettings};
pub use orchestrator::{CrawlOptions, CrawlOrchestrator, EntryReport};
pub use summary::{ArtifactReport, CrawlSummary};
