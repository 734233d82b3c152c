//! 基于 chromiumoxide 的浏览器会话实现。
//!
//! CDP 调用是异步的，会话内部持有一个独立的 tokio 运行时，对外提供阻塞接口。
//! 下载通过 `Browser.setDownloadBehavior` 写入临时目录，文件以下载 GUID 命名。

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::browser::{BrowserDownload, BrowserError, BrowserSession, VisibleControl};
use crate::base_system::context::Config;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    pub temp_parent: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl ChromiumOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            headless: cfg.headless,
            chrome_executable: cfg.chrome_executable(),
            user_agent: cfg.user_agent.clone(),
            temp_parent: cfg.temp_download_parent(),
            request_timeout: cfg.navigation_timeout(),
        }
    }
}

pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    download_dir: TempDir,
    runtime: Runtime,
}

fn cdp(err: CdpError) -> BrowserError {
    BrowserError::Protocol(err.to_string())
}

/// 单个 CDP 调用限时。
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T, CdpError>>,
) -> Result<T, BrowserError> {
    match timeout(limit, call).await {
        Ok(result) => result.map_err(cdp),
        Err(_) => Err(BrowserError::Protocol(format!(
            "{what} timed out after {limit:?}"
        ))),
    }
}

impl ChromiumSession {
    pub fn launch(options: &ChromiumOptions) -> Result<Self, BrowserError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("browser-cdp")
            .enable_all()
            .build()?;

        let download_dir = match &options.temp_parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                tempfile::Builder::new()
                    .prefix("archive-dl-")
                    .tempdir_in(parent)?
            }
            None => tempfile::Builder::new().prefix("archive-dl-").tempdir()?,
        };

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(options.request_timeout)
            .arg(format!("--user-agent={}", options.user_agent));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = runtime
            .block_on(timeout(LAUNCH_TIMEOUT, Browser::launch(config)))
            .map_err(|_| BrowserError::Launch(format!("no response after {LAUNCH_TIMEOUT:?}")))?
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target: "browser", "CDP 事件处理错误: {err}");
                }
            }
        });

        let dir = download_dir.path().to_path_buf();
        let page = runtime.block_on(async {
            let behavior = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::AllowAndName)
                .download_path(dir.to_string_lossy().into_owned())
                .events_enabled(true)
                .build()
                .map_err(BrowserError::Protocol)?;
            bounded(QUERY_TIMEOUT, "set download behavior", browser.execute(behavior)).await?;
            bounded(QUERY_TIMEOUT, "open page", browser.new_page("about:blank")).await
        })?;

        let session = Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            download_dir,
            runtime,
        };
        session.accept_dialogs()?;
        info!(
            target: "browser",
            "浏览器已启动，临时下载目录: {}",
            session.download_dir.path().display()
        );
        Ok(session)
    }

    /// 页面弹出的对话框一律确认。
    fn accept_dialogs(&self) -> Result<(), BrowserError> {
        let page = self.page()?.clone();
        self.runtime.spawn(async move {
            let listener = page.event_listener::<EventJavascriptDialogOpening>();
            let Ok(mut dialogs) = bounded(QUERY_TIMEOUT, "dialog listener", listener).await else {
                warn!(target: "browser", "无法订阅对话框事件");
                return;
            };
            while let Some(dialog) = dialogs.next().await {
                debug!(target: "browser", "自动确认对话框: {}", dialog.message);
                let accept = page.execute(HandleJavaScriptDialogParams::new(true));
                if let Err(err) = bounded(QUERY_TIMEOUT, "dialog accept", accept).await {
                    debug!(target: "browser", "确认对话框失败: {err}");
                }
            }
        });
        Ok(())
    }

    fn page(&self) -> Result<&Page, BrowserError> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }

    fn browser(&self) -> Result<&Browser, BrowserError> {
        self.browser.as_ref().ok_or(BrowserError::Closed)
    }

    fn download_events(
        &self,
    ) -> Result<
        (
            EventStream<EventDownloadWillBegin>,
            EventStream<EventDownloadProgress>,
        ),
        BrowserError,
    > {
        let browser = self.browser()?;
        self.runtime.block_on(async {
            let begin = bounded(
                QUERY_TIMEOUT,
                "download listener",
                browser.event_listener::<EventDownloadWillBegin>(),
            )
            .await?;
            let progress = bounded(
                QUERY_TIMEOUT,
                "download listener",
                browser.event_listener::<EventDownloadProgress>(),
            )
            .await?;
            Ok((begin, progress))
        })
    }
}

/// 等待第一个下载开始并完成。
async fn wait_for_download(
    begin: &mut EventStream<EventDownloadWillBegin>,
    progress: &mut EventStream<EventDownloadProgress>,
    dir: &Path,
) -> Result<BrowserDownload, BrowserError> {
    let started = begin.next().await.ok_or(BrowserError::EventStreamClosed)?;
    let guid = started.guid.clone();
    let suggested = started.suggested_filename.trim().to_string();
    debug!(target: "browser", "下载开始: {suggested} ({guid})");

    while let Some(event) = progress.next().await {
        if event.guid != guid {
            continue;
        }
        match &event.state {
            DownloadProgressState::Completed => {
                return Ok(BrowserDownload {
                    suggested_filename: (!suggested.is_empty()).then_some(suggested),
                    temp_path: Some(dir.join(&guid)),
                    reported_bytes: Some(event.received_bytes.max(0.0) as u64),
                });
            }
            DownloadProgressState::Canceled => {
                return Err(BrowserError::DownloadCanceled(guid));
            }
            DownloadProgressState::InProgress => {}
        }
    }
    Err(BrowserError::EventStreamClosed)
}

fn visibility_script(selector: &str) -> Result<String, BrowserError> {
    let quoted =
        serde_json::to_string(selector).map_err(|e| BrowserError::Protocol(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
            let el;
            try {{ el = document.querySelector({quoted}); }} catch (e) {{ return false; }}
            if (!el) return false;
            const style = window.getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()"#
    ))
}

impl BrowserSession for ChromiumSession {
    fn navigate(&mut self, url: &str, limit: Duration) -> Result<(), BrowserError> {
        let page = self.page()?;
        self.runtime.block_on(async {
            match timeout(limit, page.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(err)) => Err(cdp(err)),
                Err(_) => Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: limit,
                }),
            }
        })
    }

    fn find_visible_control(
        &mut self,
        selector: &str,
    ) -> Result<Option<VisibleControl>, BrowserError> {
        let page = self.page()?;
        let script = visibility_script(selector)?;
        let visible = self.runtime.block_on(async {
            let result = timeout(QUERY_TIMEOUT, page.evaluate(script))
                .await
                .map_err(|_| BrowserError::Protocol("visibility check timed out".to_string()))?
                .map_err(cdp)?;
            result
                .into_value::<bool>()
                .map_err(|e| BrowserError::Protocol(e.to_string()))
        })?;
        Ok(visible.then(|| VisibleControl {
            selector: selector.to_string(),
        }))
    }

    fn await_download(
        &mut self,
        control: &VisibleControl,
        limit: Duration,
    ) -> Result<BrowserDownload, BrowserError> {
        let (mut begin, mut progress) = self.download_events()?;
        let page = self.page()?;
        let dir = self.download_dir.path().to_path_buf();
        self.runtime.block_on(async {
            let element = bounded(
                QUERY_TIMEOUT,
                "element lookup",
                page.find_element(control.selector.as_str()),
            )
            .await?;
            bounded(QUERY_TIMEOUT, "click", element.click()).await?;
            timeout(limit, wait_for_download(&mut begin, &mut progress, &dir))
                .await
                .map_err(|_| BrowserError::DownloadTimeout(limit))?
        })
    }

    fn control_href(&mut self, control: &VisibleControl) -> Result<Option<String>, BrowserError> {
        let page = self.page()?;
        self.runtime.block_on(async {
            let element = bounded(
                QUERY_TIMEOUT,
                "element lookup",
                page.find_element(control.selector.as_str()),
            )
            .await?;
            bounded(QUERY_TIMEOUT, "href lookup", element.attribute("href")).await
        })
    }

    fn download_in_new_tab(
        &mut self,
        url: &str,
        limit: Duration,
    ) -> Result<BrowserDownload, BrowserError> {
        let (mut begin, mut progress) = self.download_events()?;
        let browser = self.browser()?;
        let dir = self.download_dir.path().to_path_buf();
        self.runtime.block_on(async {
            let tab = bounded(QUERY_TIMEOUT, "open tab", browser.new_page("about:blank")).await?;
            // 直接下载的地址导航通常以 ERR_ABORTED 结束，忽略导航结果
            if let Err(err) = bounded(limit, "tab navigation", tab.goto(url)).await {
                debug!(target: "browser", "新标签页导航返回错误（下载时常见）: {err}");
            }
            let result = timeout(limit, wait_for_download(&mut begin, &mut progress, &dir))
                .await
                .map_err(|_| BrowserError::DownloadTimeout(limit))
                .and_then(|r| r);
            if let Err(err) = bounded(CLOSE_TIMEOUT, "close tab", tab.close()).await {
                debug!(target: "browser", "关闭新标签页失败: {err}");
            }
            result
        })
    }

    fn save_download(
        &mut self,
        download: &BrowserDownload,
        dest: &Path,
    ) -> Result<u64, BrowserError> {
        let source = download.temp_path.as_deref().ok_or_else(|| {
            BrowserError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "download has no temporary file",
            ))
        })?;
        Ok(fs::copy(source, dest)?)
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        let page = self.page.take();
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self.runtime.block_on(async {
            if let Some(page) = page {
                let _ = timeout(CLOSE_TIMEOUT, page.close()).await;
            }
            let closed = timeout(CLOSE_TIMEOUT, browser.close()).await;
            let _ = timeout(CLOSE_TIMEOUT, browser.wait()).await;
            match closed {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(err)) => Err(cdp(err)),
                Err(_) => Err(BrowserError::Protocol("browser close timed out".to_string())),
            }
        });
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if self.browser.is_some()
            && let Err(err) = self.close()
        {
            warn!(target: "browser", "浏览器关闭失败: {err}");
        }
    }
}
