//! 集成测试共用的内存假实现：静态站点与浏览器。
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use archive_crawler::base_system::context::Config;
use archive_crawler::base_system::interrupt::InterruptFlag;
use archive_crawler::base_system::ledger::ProgressLedger;
use archive_crawler::download::{
    ArtifactDownloader, BrowserDownload, BrowserError, BrowserSession, BrowserSlot, CrawlOptions,
    CrawlOrchestrator, DownloaderSettings, VisibleControl,
};
use archive_crawler::network_parser::site::SiteLayout;
use archive_crawler::network_parser::{FetchError, FetchedPage, PageFetcher};

pub const BASE: &str = "http://archive.test";

pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.base_url = BASE.to_string();
    cfg
}

pub fn site() -> SiteLayout {
    SiteLayout::from_config(&config()).expect("test layout")
}

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

// ── 静态站点 ────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeSite {
    pages: Rc<RefCell<HashMap<String, (String, String)>>>,
    unstable: Rc<RefCell<Vec<String>>>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, body: &str) -> &Self {
        self.redirect(url, url, body)
    }

    /// 请求 `url` 时重定向到 `final_url`。
    pub fn redirect(&self, url: &str, final_url: &str, body: &str) -> &Self {
        self.pages
            .borrow_mut()
            .insert(url.to_string(), (final_url.to_string(), body.to_string()));
        self
    }

    /// 请求 `url` 时返回瞬时错误（重试耗尽）。
    pub fn unstable(&self, url: &str) -> &Self {
        self.unstable.borrow_mut().push(url.to_string());
        self
    }

    pub fn remove(&self, url: &str) {
        self.pages.borrow_mut().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }
}

impl PageFetcher for FakeSite {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        if self.unstable.borrow().iter().any(|u| u == url) {
            return Err(FetchError::Transient {
                url: url.to_string(),
                attempts: 3,
                reason: "HTTP 503".to_string(),
            });
        }
        match self.pages.borrow().get(url) {
            Some((final_url, body)) => Ok(FetchedPage {
                requested_url: url.to_string(),
                final_url: final_url.clone(),
                status: 200,
                body: body.clone(),
            }),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// 总目录页：每行第二列是条目链接。
pub fn catalog_html(rows: &[(&str, &str)]) -> String {
    let mut html = String::from(
        "<html><body><table><thead><tr><th>번호</th><th>서명</th></tr></thead><tbody>",
    );
    for (idx, (title, href)) in rows.iter().enumerate() {
        html.push_str(&format!(
            "<tr><td>{}</td><td><a href=\"{href}\">{title}</a></td></tr>",
            idx + 1
        ));
    }
    html.push_str("</tbody></table></body></html>");
    html
}

/// 内容列表页：单层嵌套列表，每项一个详情链接。
pub fn content_list_html(links: &[(&str, &str)]) -> String {
    let mut html = String::from("<html><body><ul class=\"dep_01\"><li>목차<ul>");
    for (title, href) in links {
        html.push_str(&format!("<li><a href=\"{href}\">{title}</a></li>"));
    }
    html.push_str("</ul></li></ul></body></html>");
    html
}

/// 书目列表页：表格中的全部链接。
pub fn book_list_html(links: &[(&str, &str)]) -> String {
    let mut html = String::from("<html><body><table class=\"bookListTable\"><tbody>");
    for (title, href) in links {
        html.push_str(&format!("<tr><td><a href=\"{href}\">{title}</a></td></tr>"));
    }
    html.push_str("</tbody></table></body></html>");
    html
}

// ── 浏览器 ──────────────────────────────────────────────────────

/// 详情页上的下载行为。
#[derive(Debug, Clone)]
pub enum Artifact {
    /// 正常下载，`suggested` 为浏览器建议的文件名。
    Xml {
        suggested: Option<String>,
        body: String,
    },
    /// 浏览器报告成功，但落盘为 0 字节且没有临时文件。
    ZeroByte,
    /// 页面上没有可见的下载按钮。
    NoControl,
    /// 点击后没有下载事件，href 也不可用。
    Timeout,
    /// 点击后没有下载事件，但按钮 href 在新标签页中可以下载。
    HrefOnly { href: String, body: String },
    /// 浏览器报告下载，但保存到目标位置失败，也没有临时文件。
    SaveFails { suggested: String },
}

#[derive(Default)]
pub struct BrowserState {
    pub artifacts: HashMap<String, Artifact>,
    pub current: Option<String>,
    pub visited: Vec<String>,
    pub launches: usize,
    pub closes: usize,
    pub new_tabs: Vec<String>,
    /// 下载该地址时置位停止标志。
    pub interrupt_on: Option<(String, InterruptFlag)>,
    temp_seq: usize,
}

#[derive(Clone)]
pub struct FakeBrowser {
    state: Rc<RefCell<BrowserState>>,
    temp_dir: PathBuf,
}

impl FakeBrowser {
    pub fn new(temp_dir: &Path) -> Self {
        fs::create_dir_all(temp_dir).expect("temp dir");
        Self {
            state: Rc::new(RefCell::new(BrowserState::default())),
            temp_dir: temp_dir.to_path_buf(),
        }
    }

    pub fn artifact(&self, url: &str, artifact: Artifact) -> &Self {
        self.state
            .borrow_mut()
            .artifacts
            .insert(url.to_string(), artifact);
        self
    }

    pub fn xml(&self, url: &str, body: &str) -> &Self {
        self.artifact(
            url,
            Artifact::Xml {
                suggested: None,
                body: body.to_string(),
            },
        )
    }

    pub fn interrupt_on(&self, url: &str, flag: &InterruptFlag) -> &Self {
        self.state.borrow_mut().interrupt_on = Some((url.to_string(), flag.clone()));
        self
    }

    pub fn new_tabs(&self) -> Vec<String> {
        self.state.borrow().new_tabs.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.borrow().visited.clone()
    }

    pub fn launches(&self) -> usize {
        self.state.borrow().launches
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    pub fn slot(&self) -> BrowserSlot {
        let browser = self.clone();
        BrowserSlot::new(Box::new(move || {
            browser.state.borrow_mut().launches += 1;
            Ok(Box::new(browser.clone()) as Box<dyn BrowserSession>)
        }))
    }

    fn temp_file(&self, body: &str) -> Result<PathBuf, BrowserError> {
        let temp = {
            let mut state = self.state.borrow_mut();
            state.temp_seq += 1;
            self.temp_dir.join(format!("guid-{}", state.temp_seq))
        };
        fs::write(&temp, body)?;
        Ok(temp)
    }

    fn current_artifact(&self) -> Option<Artifact> {
        let state = self.state.borrow();
        state
            .current
            .as_ref()
            .and_then(|url| state.artifacts.get(url).cloned())
    }
}

impl BrowserSession for FakeBrowser {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        let mut state = self.state.borrow_mut();
        state.current = Some(url.to_string());
        state.visited.push(url.to_string());
        Ok(())
    }

    fn find_visible_control(
        &mut self,
        selector: &str,
    ) -> Result<Option<VisibleControl>, BrowserError> {
        let visible = match self.current_artifact() {
            Some(Artifact::NoControl) | None => false,
            Some(_) => selector == "a.btn_down",
        };
        Ok(visible.then(|| VisibleControl {
            selector: selector.to_string(),
        }))
    }

    fn await_download(
        &mut self,
        _control: &VisibleControl,
        timeout: Duration,
    ) -> Result<BrowserDownload, BrowserError> {
        {
            let state = self.state.borrow();
            if let (Some((url, flag)), Some(current)) = (&state.interrupt_on, &state.current) {
                if url == current {
                    flag.trigger();
                }
            }
        }
        match self.current_artifact() {
            Some(Artifact::Xml { suggested, body }) => {
                let temp = self.temp_file(&body)?;
                Ok(BrowserDownload {
                    suggested_filename: suggested,
                    temp_path: Some(temp),
                    reported_bytes: Some(body.len() as u64),
                })
            }
            Some(Artifact::ZeroByte) => Ok(BrowserDownload {
                suggested_filename: Some("empty.xml".to_string()),
                temp_path: None,
                reported_bytes: Some(0),
            }),
            Some(Artifact::SaveFails { suggested }) => Ok(BrowserDownload {
                suggested_filename: Some(suggested),
                temp_path: None,
                reported_bytes: Some(0),
            }),
            _ => Err(BrowserError::DownloadTimeout(timeout)),
        }
    }

    fn control_href(&mut self, _control: &VisibleControl) -> Result<Option<String>, BrowserError> {
        match self.current_artifact() {
            Some(Artifact::HrefOnly { href, .. }) => Ok(Some(href)),
            _ => Ok(Some("javascript:fnDown();".to_string())),
        }
    }

    fn download_in_new_tab(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<BrowserDownload, BrowserError> {
        self.state.borrow_mut().new_tabs.push(url.to_string());
        match self.current_artifact() {
            Some(Artifact::HrefOnly { href, body }) if url.ends_with(href.as_str()) => {
                let temp = self.temp_file(&body)?;
                Ok(BrowserDownload {
                    suggested_filename: None,
                    temp_path: Some(temp),
                    reported_bytes: Some(body.len() as u64),
                })
            }
            _ => Err(BrowserError::DownloadTimeout(timeout)),
        }
    }

    fn save_download(
        &mut self,
        download: &BrowserDownload,
        dest: &Path,
    ) -> Result<u64, BrowserError> {
        if let Some(Artifact::SaveFails { .. }) = self.current_artifact() {
            return Err(BrowserError::Io(std::io::Error::other("disk full")));
        }
        match download.temp_path.as_deref() {
            Some(temp) => Ok(fs::copy(temp, dest)?),
            None => {
                fs::write(dest, b"")?;
                Ok(0)
            }
        }
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        self.state.borrow_mut().closes += 1;
        Ok(())
    }
}

// ── 组装 ────────────────────────────────────────────────────────

pub fn settings() -> DownloaderSettings {
    DownloaderSettings {
        navigation_timeout: Duration::from_secs(1),
        download_timeout: Duration::from_secs(1),
        settle_delay: Duration::ZERO,
        save_wait: Duration::ZERO,
        ..DownloaderSettings::from_config(&config())
    }
}

pub fn downloader(browser: &FakeBrowser) -> ArtifactDownloader {
    ArtifactDownloader::new(browser.slot(), settings(), site())
}

pub fn ledger_path(data: &Path) -> PathBuf {
    data.join("downloaded_classic.txt")
}

pub fn download_root(data: &Path) -> PathBuf {
    data.join("docs")
}

pub fn orchestrator_with(
    site_pages: &FakeSite,
    browser: &FakeBrowser,
    data: &Path,
    interrupt: InterruptFlag,
    options: CrawlOptions,
) -> CrawlOrchestrator {
    CrawlOrchestrator::new(
        Box::new(site_pages.clone()),
        site(),
        ProgressLedger::open(ledger_path(data)),
        downloader(browser),
        download_root(data),
        interrupt,
        options,
    )
}

pub fn orchestrator(site_pages: &FakeSite, browser: &FakeBrowser, data: &Path) -> CrawlOrchestrator {
    orchestrator_with(
        site_pages,
        browser,
        data,
        InterruptFlag::new(),
        CrawlOptions::default(),
    )
}

pub fn ledger_lines(data: &Path) -> Vec<String> {
    fs::read_to_string(ledger_path(data))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
