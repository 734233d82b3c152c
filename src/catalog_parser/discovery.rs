//! 总目录抓取：解析目录表格，过滤已完成条目。

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::models::CatalogEntry;
use crate::base_system::ledger::ProgressLedger;
use crate::network_parser::PageFetcher;
use crate::network_parser::site::{SiteLayout, stripped_text};

/// 一次目录抓取的结果。
#[derive(Debug, Default, Clone)]
pub struct CatalogListing {
    /// 待处理条目（文档顺序）。
    pub entries: Vec<CatalogEntry>,
    /// 因已在完成记录中而跳过的条目数。
    pub skipped: usize,
}

impl CatalogListing {
    pub fn discovered(&self) -> usize {
        self.entries.len() + self.skipped
    }
}

/// 抓取总目录页并排除已完成条目。抓取失败返回空结果。
pub fn fetch_catalog<F>(fetcher: &F, site: &SiteLayout, ledger: &ProgressLedger) -> CatalogListing
where
    F: PageFetcher + ?Sized,
{
    info!(target: "catalog", "获取总目录: {}", site.catalog_url);
    let page = match fetcher.fetch(&site.catalog_url, site.page_timeout) {
        Ok(page) => page,
        Err(err) => {
            warn!(target: "catalog", "总目录获取失败: {err}");
            return CatalogListing::default();
        }
    };

    let all = parse_catalog(&page.body, site);
    let mut listing = CatalogListing::default();
    for entry in all {
        if ledger.contains(&entry.title) {
            debug!(target: "catalog", "已完成，跳过: {}", entry.title);
            listing.skipped += 1;
        } else {
            listing.entries.push(entry);
        }
    }

    info!(
        target: "catalog",
        "目录条目 {} 个，已完成跳过 {} 个，待处理 {} 个",
        listing.discovered(),
        listing.skipped,
        listing.entries.len()
    );
    listing
}

/// 从目录页 HTML 中提取条目（不做完成记录过滤）。
///
/// 取第一个目录表格的 `tbody > tr`，在指定列中寻找第一个带 href 的链接，
/// 只保留书目列表 / 内容列表两类地址。
pub fn parse_catalog(html: &str, site: &SiteLayout) -> Vec<CatalogEntry> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&site.catalog_table).next() else {
        warn!(target: "catalog", "目录页中没有找到目录表格");
        return Vec::new();
    };

    let (Ok(row_sel), Ok(cell_sel), Ok(link_sel)) = (
        Selector::parse("tbody > tr"),
        Selector::parse("td"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for row in table.select(&row_sel) {
        let Some(cell) = row.select(&cell_sel).nth(site.catalog_title_cell) else {
            continue;
        };
        let Some(link) = cell.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !site.is_catalog_entry_link(href) {
            continue;
        }
        let title = stripped_text(&link);
        if title.is_empty() {
            continue;
        }
        entries.push(CatalogEntry::new(title, site.absolutize(href)));
    }
    entries
}
