//! 详情页文档下载：定位下载按钮，触发浏览器原生下载并校验落盘结果。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::browser::{BrowserDownload, BrowserError, BrowserSession, BrowserSlot, VisibleControl};
use crate::base_system::context::Config;
use crate::base_system::fs_names::sanitize_filename;
use crate::catalog_parser::models::{DetailLink, DownloadOutcome};
use crate::network_parser::site::SiteLayout;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no visible download control on {0}")]
    NoDownloadControl(String),
    #[error("download did not complete for {url}: {reason}")]
    DownloadTimeout { url: String, reason: String },
    #[error("saved artifact is empty: {0}")]
    EmptyArtifact(PathBuf),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    /// 按顺序尝试，取第一个可见的。
    pub selectors: Vec<String>,
    pub navigation_timeout: Duration,
    pub download_timeout: Duration,
    pub settle_delay: Duration,
    pub save_wait: Duration,
    pub artifact_extension: String,
}

impl DownloaderSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            selectors: cfg
                .download_selectors
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            navigation_timeout: cfg.navigation_timeout(),
            download_timeout: cfg.download_timeout(),
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            save_wait: Duration::from_millis(cfg.save_wait_ms),
            artifact_extension: cfg.artifact_extension.trim_start_matches('.').to_string(),
        }
    }
}

pub struct ArtifactDownloader {
    slot: BrowserSlot,
    settings: DownloaderSettings,
    site: SiteLayout,
}

impl ArtifactDownloader {
    pub fn new(slot: BrowserSlot, settings: DownloaderSettings, site: SiteLayout) -> Self {
        Self {
            slot,
            settings,
            site,
        }
    }

    /// 下载一个详情页的文档到 `dest_dir`。任何错误都转换为失败结果。
    pub fn download(&mut self, link: &DetailLink, dest_dir: &Path, prefix: &str) -> DownloadOutcome {
        let started = Instant::now();
        match self.try_download(link, dest_dir, prefix) {
            Ok((path, size)) => {
                info!(
                    target: "download",
                    "    保存完成: {} ({size} bytes, {:.2}s)",
                    path.display(),
                    started.elapsed().as_secs_f32()
                );
                DownloadOutcome::success(link.clone(), path, size)
            }
            Err(err) => {
                warn!(target: "download", "    下载失败: {} => {err}", link.url);
                DownloadOutcome::failure(link.clone(), err.to_string())
            }
        }
    }

    /// 关闭浏览器（只生效一次）。
    pub fn shutdown(&mut self) {
        self.slot.shutdown();
    }

    pub fn try_download(
        &mut self,
        link: &DetailLink,
        dest_dir: &Path,
        prefix: &str,
    ) -> Result<(PathBuf, u64), DownloadError> {
        fs::create_dir_all(dest_dir)?;
        let settings = &self.settings;
        let site = &self.site;
        let session = self.slot.session()?;

        let step = Instant::now();
        session.navigate(&link.url, settings.navigation_timeout)?;
        debug!(target: "download", "    页面加载: {:.2}s", step.elapsed().as_secs_f32());
        pause(settings.settle_delay);

        let control = find_control(session, &settings.selectors)?
            .ok_or_else(|| DownloadError::NoDownloadControl(link.url.clone()))?;
        debug!(target: "download", "    下载按钮: {}", control.selector);

        let step = Instant::now();
        let download = match session.await_download(&control, settings.download_timeout) {
            Ok(download) => download,
            Err(err) => {
                debug!(target: "download", "    点击下载失败，尝试直接访问链接: {err}");
                fallback_download(session, &control, link, site, settings.download_timeout)?
            }
        };
        debug!(target: "download", "    文件下载: {:.2}s", step.elapsed().as_secs_f32());

        let filename = artifact_filename(&download, link, prefix, site, &settings.artifact_extension);
        let dest = dest_dir.join(&filename);
        remove_stale(&dest)?;
        let save_error = match session.save_download(&download, &dest) {
            Ok(_) => None,
            Err(err) => {
                debug!(target: "download", "    保存下载失败，改用临时文件: {err}");
                Some(err)
            }
        };
        pause(settings.save_wait);

        verify_saved(&dest, &download, save_error)
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

/// 依次尝试选择器，返回第一个可见控件。单个选择器出错视为未命中。
fn find_control(
    session: &mut dyn BrowserSession,
    selectors: &[String],
) -> Result<Option<VisibleControl>, DownloadError> {
    for selector in selectors {
        match session.find_visible_control(selector) {
            Ok(Some(control)) => return Ok(Some(control)),
            Ok(None) => {}
            Err(BrowserError::Closed) => return Err(BrowserError::Closed.into()),
            Err(err) => debug!(target: "download", "    选择器 {selector} 检查失败: {err}"),
        }
    }
    Ok(None)
}

/// 读取按钮的 href，在新标签页中直接访问以触发下载。
fn fallback_download(
    session: &mut dyn BrowserSession,
    control: &VisibleControl,
    link: &DetailLink,
    site: &SiteLayout,
    timeout: Duration,
) -> Result<BrowserDownload, DownloadError> {
    let fail = |reason: String| DownloadError::DownloadTimeout {
        url: link.url.clone(),
        reason,
    };

    let href = session
        .control_href(control)
        .map_err(|e| fail(e.to_string()))?
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && !h.to_ascii_lowercase().starts_with("javascript:"))
        .ok_or_else(|| fail("download control has no usable href".to_string()))?;

    let target = site.absolutize(&href);
    session
        .download_in_new_tab(&target, timeout)
        .map_err(|e| fail(e.to_string()))
}

/// 浏览器建议的文件名优先，否则用 `{prefix}_{recordId}.{ext}`。结果一律做非法字符替换。
pub fn artifact_filename(
    download: &BrowserDownload,
    link: &DetailLink,
    prefix: &str,
    site: &SiteLayout,
    extension: &str,
) -> String {
    if let Some(suggested) = download
        .suggested_filename
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return sanitize_filename(suggested);
    }

    let record_id = site
        .record_id(&link.url)
        .unwrap_or_else(|| "unknown".to_string());
    let name = if prefix.is_empty() {
        format!("{record_id}.{extension}")
    } else {
        format!("{prefix}_{record_id}.{extension}")
    };
    sanitize_filename(&name)
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// 同名文件可能来自上一次运行，保存前先删掉。
fn remove_stale(dest: &Path) -> Result<(), DownloadError> {
    match fs::remove_file(dest) {
        Ok(()) => {
            debug!(target: "download", "    覆盖旧文件: {}", dest.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// 文件必须由本次保存写入且非空；否则尝试从浏览器临时文件复制一次。
/// 保存失败时 `dest` 的内容不可信，只接受临时文件复制的结果。
fn verify_saved(
    dest: &Path,
    download: &BrowserDownload,
    save_error: Option<BrowserError>,
) -> Result<(PathBuf, u64), DownloadError> {
    if save_error.is_none() {
        let size = file_size(dest);
        if size > 0 {
            return Ok((dest.to_path_buf(), size));
        }
    }

    if let Some(temp) = download.temp_path.as_deref().filter(|p| p.exists()) {
        debug!(target: "download", "    从临时文件复制: {}", temp.display());
        fs::copy(temp, dest)?;
        let size = file_size(dest);
        if size > 0 {
            return Ok((dest.to_path_buf(), size));
        }
    }

    match save_error {
        Some(err) => Err(err.into()),
        None => Err(DownloadError::EmptyArtifact(dest.to_path_buf())),
    }
}
