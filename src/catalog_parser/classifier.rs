//! 条目链接类型判定。

use scraper::Html;
use tracing::{debug, warn};

use super::models::PageKind;
use crate::network_parser::PageFetcher;
use crate::network_parser::site::SiteLayout;

/// 请求条目地址（跟随重定向）并判定页面类型。
///
/// 重定向后的最终地址优先于页面结构；请求失败时退回到原始地址的标记。
pub fn classify<F>(fetcher: &F, site: &SiteLayout, url: &str) -> PageKind
where
    F: PageFetcher + ?Sized,
{
    match fetcher.fetch(url, site.classify_timeout) {
        Ok(page) => {
            let kind = classify_page(&page.final_url, &page.body, site);
            debug!(target: "classify", "{url} -> {} => {kind}", page.final_url);
            kind
        }
        Err(err) => {
            let kind = PageKind::from_url(url, site);
            warn!(target: "classify", "判定请求失败，按原始地址判定为 {kind}: {err}");
            kind
        }
    }
}

/// 纯判定逻辑：先看最终地址，再看页面结构。
pub fn classify_page(final_url: &str, body: &str, site: &SiteLayout) -> PageKind {
    let by_url = PageKind::from_url(final_url, site);
    if by_url.is_known() {
        return by_url;
    }
    PageKind::from_structure(&Html::parse_document(body), site)
}
