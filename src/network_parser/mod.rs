//! 静态页面抓取与站点结构描述。
//!
//! - `network` — 阻塞式 HTTP 客户端（重试 / 节流）
//! - `site`    — URL 标记、选择器与相对链接补全

pub mod network;
pub mod site;

use std::time::Duration;

use thiserror::Error;

/// 一次 GET 的结果；`final_url` 是跟随重定向后的地址。
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient network error for {url} after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        attempts: usize,
        reason: String,
    },
    #[error("page not found for {url} (HTTP {status})")]
    NotFound { url: String, status: u16 },
    #[error("malformed response for {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// 仅瞬时错误参与退避重试。
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// 静态页面抓取能力。单线程顺序调用，无需 `Sync`。
pub trait PageFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

impl<T: PageFetcher + ?Sized> PageFetcher for &T {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url, timeout)
    }
}

impl<T: PageFetcher + ?Sized> PageFetcher for Box<T> {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url, timeout)
    }
}
