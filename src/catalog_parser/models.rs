//! 目录爬取相关的数据模型定义。
//!
//! 包含目录条目、详情链接、下载结果与条目状态。

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::network_parser::site::SiteLayout;

/// 目录条目指向的页面类型，每种类型对应一种解析策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum PageKind {
    #[default]
    Unknown,
    BookList,
    ContentList,
}

impl PageKind {
    /// 根据 URL 标记判定；内容列表标记优先。
    pub fn from_url(url: &str, site: &SiteLayout) -> Self {
        if site.is_content_list(url) {
            PageKind::ContentList
        } else if site.is_book_list(url) {
            PageKind::BookList
        } else {
            PageKind::Unknown
        }
    }

    /// 根据页面结构判定：嵌套列表容器 ⇒ 内容列表，书目表格 ⇒ 书目列表。
    pub fn from_structure(doc: &scraper::Html, site: &SiteLayout) -> Self {
        if doc.select(&site.content_list_container).next().is_some() {
            PageKind::ContentList
        } else if doc.select(&site.book_list_table).next().is_some() {
            PageKind::BookList
        } else {
            PageKind::Unknown
        }
    }

    pub fn is_known(self) -> bool {
        self != PageKind::Unknown
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageKind::Unknown => "unknown",
            PageKind::BookList => "book-list",
            PageKind::ContentList => "content-list",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// 目录中显示的原始标题，同时是续传记录的键。
    pub title: String,
    pub url: String,
    pub kind: PageKind,
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            kind: PageKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailLink {
    pub title: String,
    pub url: String,
}

impl DetailLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub detail: DetailLink,
    pub succeeded: bool,
    pub saved_path: Option<PathBuf>,
    pub byte_size: Option<u64>,
    /// 失败原因（成功时为 None）。
    pub failure: Option<String>,
}

impl DownloadOutcome {
    pub fn success(detail: DetailLink, saved_path: PathBuf, byte_size: u64) -> Self {
        Self {
            detail,
            succeeded: true,
            saved_path: Some(saved_path),
            byte_size: Some(byte_size),
            failure: None,
        }
    }

    pub fn failure(detail: DetailLink, reason: impl Into<String>) -> Self {
        Self {
            detail,
            succeeded: false,
            saved_path: None,
            byte_size: None,
            failure: Some(reason.into()),
        }
    }
}

/// 单个目录条目的处理状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    Discovered,
    Classified,
    Resolved,
    Downloading,
    Complete,
    PartialFailure,
    EmptyComplete,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::Complete | EntryState::PartialFailure | EntryState::EmptyComplete
        )
    }

    /// 终态中需要写入完成记录的两种。
    pub fn records_completion(self) -> bool {
        matches!(self, EntryState::Complete | EntryState::EmptyComplete)
    }
}
