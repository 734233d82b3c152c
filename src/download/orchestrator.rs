//! 爬取主流程：目录 → 类型判定 → 详情展开 → 逐个下载 → 完成记录。

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use super::browser::{BrowserSession, BrowserSlot};
use super::chromium::{ChromiumOptions, ChromiumSession};
use super::downloader::{ArtifactDownloader, DownloaderSettings};
use super::progress::EntryProgress;
use super::summary::CrawlSummary;
use crate::base_system::context::Config;
use crate::base_system::fs_names::{TitleRegistry, entry_folder_name};
use crate::base_system::interrupt::InterruptFlag;
use crate::base_system::ledger::ProgressLedger;
use crate::catalog_parser::classifier::classify;
use crate::catalog_parser::discovery::fetch_catalog;
use crate::catalog_parser::models::{CatalogEntry, DownloadOutcome, EntryState, PageKind};
use crate::catalog_parser::resolver::DetailResolver;
use crate::network_parser::PageFetcher;
use crate::network_parser::network::{ArchiveHttpClient, HttpClientConfig};
use crate::network_parser::site::SiteLayout;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// 相邻两个下载之间的固定间隔（礼貌限速，不是重试退避）。
    pub link_delay: Duration,
    pub entry_delay: Duration,
    /// 只判定与展开，不启动浏览器，不写完成记录。
    pub dry_run: bool,
    pub max_entries: Option<usize>,
    pub show_progress: bool,
}

impl CrawlOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            link_delay: Duration::from_millis(cfg.link_delay_ms),
            entry_delay: Duration::from_millis(cfg.entry_delay_ms),
            dry_run: false,
            max_entries: None,
            show_progress: cfg.show_progress,
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            link_delay: Duration::ZERO,
            entry_delay: Duration::ZERO,
            dry_run: false,
            max_entries: None,
            show_progress: false,
        }
    }
}

/// 单个条目的处理结果。
#[derive(Debug, Clone)]
pub struct EntryReport {
    pub title: String,
    pub kind: PageKind,
    pub state: EntryState,
    pub outcomes: Vec<DownloadOutcome>,
    pub directory: Option<PathBuf>,
    /// 因停止信号未处理完。
    pub abandoned: bool,
}

impl EntryReport {
    fn new(entry: &CatalogEntry) -> Self {
        Self {
            title: entry.title.clone(),
            kind: entry.kind,
            state: EntryState::Discovered,
            outcomes: Vec::new(),
            directory: None,
            abandoned: false,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }
}

pub struct CrawlOrchestrator {
    fetcher: Box<dyn PageFetcher>,
    site: SiteLayout,
    ledger: ProgressLedger,
    downloader: ArtifactDownloader,
    download_root: PathBuf,
    titles: TitleRegistry,
    interrupt: InterruptFlag,
    options: CrawlOptions,
}

impl CrawlOrchestrator {
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        site: SiteLayout,
        ledger: ProgressLedger,
        downloader: ArtifactDownloader,
        download_root: PathBuf,
        interrupt: InterruptFlag,
        options: CrawlOptions,
    ) -> Self {
        Self {
            fetcher,
            site,
            ledger,
            downloader,
            download_root,
            titles: TitleRegistry::new(),
            interrupt,
            options,
        }
    }

    /// 按配置组装：HTTP 客户端、站点结构、完成记录与 Chromium 下载器。
    pub fn from_config(
        cfg: &Config,
        interrupt: InterruptFlag,
        options: CrawlOptions,
    ) -> anyhow::Result<Self> {
        let fetcher = ArchiveHttpClient::new(HttpClientConfig::from_config(cfg))
            .context("创建 HTTP 客户端失败")?;
        let site = SiteLayout::from_config(cfg)?;
        let ledger = ProgressLedger::open(cfg.ledger_path());

        let chromium = ChromiumOptions::from_config(cfg);
        let slot = BrowserSlot::new(Box::new(move || {
            ChromiumSession::launch(&chromium).map(|s| Box::new(s) as Box<dyn BrowserSession>)
        }));
        let downloader =
            ArtifactDownloader::new(slot, DownloaderSettings::from_config(cfg), site.clone());

        let download_root = cfg.download_root();
        std::fs::create_dir_all(&download_root)
            .with_context(|| format!("创建下载目录失败: {}", download_root.display()))?;

        Ok(Self::new(
            Box::new(fetcher),
            site,
            ledger,
            downloader,
            download_root,
            interrupt,
            options,
        ))
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn download_root(&self) -> &std::path::Path {
        &self.download_root
    }

    /// 完整跑一遍目录。单个条目或链接的错误不会中断整体流程。
    pub fn run(&mut self) -> CrawlSummary {
        let mut summary = CrawlSummary::default();
        if self.ledger.is_degraded() {
            warn!(target: "crawl", "完成记录不可用，本次运行无法保证续传");
        }

        let listing = fetch_catalog(self.fetcher.as_ref(), &self.site, &self.ledger);
        summary.discovered = listing.discovered();
        summary.skipped = listing.skipped;

        let total = listing.entries.len();
        for (idx, mut entry) in listing.entries.into_iter().enumerate() {
            if self.interrupt.is_set() {
                summary.interrupted = true;
                break;
            }
            if self
                .options
                .max_entries
                .is_some_and(|max| summary.processed >= max)
            {
                info!(target: "crawl", "已达到条目数上限，停止");
                break;
            }
            if idx > 0 {
                pause(self.options.entry_delay);
            }

            info!(target: "crawl", "[{}/{}] 开始: {}", idx + 1, total, entry.title);
            let report = self.crawl_entry(&mut entry);

            if report.kind == PageKind::Unknown {
                summary.unknown += 1;
            }
            summary.links_attempted += report.outcomes.len();
            summary.links_succeeded += report.succeeded();
            summary.record_entry(report.state);
            if report.abandoned {
                summary.interrupted = true;
                break;
            }
        }

        info!(target: "crawl", "\n{summary}");
        summary
    }

    /// 处理单个目录条目并推进其状态。
    pub fn crawl_entry(&mut self, entry: &mut CatalogEntry) -> EntryReport {
        let mut report = EntryReport::new(entry);

        entry.kind = classify(self.fetcher.as_ref(), &self.site, &entry.url);
        report.kind = entry.kind;
        if !entry.kind.is_known() {
            warn!(
                target: "crawl",
                "无法判定链接类型，跳过（下次重试）: {} ({})",
                entry.title,
                entry.url
            );
            report.state = EntryState::PartialFailure;
            return report;
        }
        report.state = EntryState::Classified;
        info!(target: "crawl", "  类型: {}", entry.kind);

        let resolved =
            DetailResolver::new(self.fetcher.as_ref(), &self.site).resolve_with_report(entry);
        report.state = EntryState::Resolved;
        let links = resolved.links;
        info!(target: "crawl", "  找到 {} 个详情页", links.len());

        if links.is_empty() {
            if resolved.unreachable_pages > 0 {
                warn!(
                    target: "crawl",
                    "  {} 个页面未取到，暂不记为完成: {}",
                    resolved.unreachable_pages,
                    entry.title
                );
                report.state = EntryState::PartialFailure;
            } else {
                warn!(target: "crawl", "  没有可下载的文档，记为完成: {}", entry.title);
                report.state = EntryState::EmptyComplete;
                self.record_completion(&entry.title);
            }
            return report;
        }

        if self.options.dry_run {
            for link in &links {
                info!(target: "crawl", "    {} => {}", link.title, link.url);
            }
            return report;
        }

        let folder = self.titles.unique(&entry_folder_name(&entry.title));
        let dir = self.download_root.join(&folder);
        report.directory = Some(dir.clone());
        report.state = EntryState::Downloading;

        let mut progress = EntryProgress::new(self.options.show_progress, &entry.title, links.len());
        for (idx, link) in links.iter().enumerate() {
            if self.interrupt.is_set() {
                warn!(target: "crawl", "  收到停止信号，放弃当前条目: {}", entry.title);
                report.abandoned = true;
                break;
            }
            if idx > 0 {
                pause(self.options.link_delay);
            }

            info!(target: "crawl", "  [{}/{}] {} 下载中...", idx + 1, links.len(), link.title);
            progress.set_message(&link.title);
            let outcome = if link.url.starts_with("http://") || link.url.starts_with("https://") {
                self.downloader.download(link, &dir, &folder)
            } else {
                warn!(target: "crawl", "    地址格式错误: {}", link.url);
                DownloadOutcome::failure(link.clone(), format!("invalid url: {}", link.url))
            };
            if !outcome.succeeded {
                progress.println(&format!("失败: {}", link.title));
            }
            report.outcomes.push(outcome);
            progress.inc();
        }
        progress.finish();

        let succeeded = report.succeeded();
        info!(
            target: "crawl",
            "条目 '{}' 结束: {}/{} 个文档下载成功",
            entry.title,
            succeeded,
            links.len()
        );

        if !report.abandoned && succeeded == links.len() {
            report.state = EntryState::Complete;
            self.record_completion(&entry.title);
        } else {
            report.state = EntryState::PartialFailure;
            if succeeded > 0 {
                warn!(target: "crawl", "  部分文档下载失败，下次运行将整体重试");
            } else {
                warn!(target: "crawl", "  没有任何文档下载成功，下次运行将重试");
            }
        }
        report
    }

    fn record_completion(&mut self, title: &str) {
        if self.options.dry_run {
            return;
        }
        self.ledger.mark_complete(title);
    }

    /// 关闭浏览器会话。
    pub fn shutdown(&mut self) {
        self.downloader.shutdown();
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
