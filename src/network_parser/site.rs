use std::time::Duration;

use reqwest::Url;
use scraper::Selector;

use crate::base_system::config::ConfigError;
use crate::base_system::context::Config;

/// 站点结构：URL 标记、CSS 选择器与链接补全规则。
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub base_url: String,
    pub catalog_url: String,
    pub relative_link_prefix: String,
    pub book_list_marker: String,
    pub content_list_marker: String,
    pub detail_marker: String,
    pub catalog_table: Selector,
    pub catalog_title_cell: usize,
    pub content_list_container: Selector,
    pub book_list_table: Selector,
    pub record_id_param: String,
    pub page_timeout: Duration,
    pub classify_timeout: Duration,
}

impl SiteLayout {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: cfg.base_url.trim().trim_end_matches('/').to_string(),
            catalog_url: cfg.catalog_url(),
            relative_link_prefix: cfg.relative_link_prefix.clone(),
            book_list_marker: cfg.book_list_marker.clone(),
            content_list_marker: cfg.content_list_marker.clone(),
            detail_marker: cfg.detail_marker.clone(),
            catalog_table: parse_selector("catalog_table_selector", &cfg.catalog_table_selector)?,
            catalog_title_cell: cfg.catalog_title_cell,
            content_list_container: parse_selector(
                "content_list_container",
                &cfg.content_list_container,
            )?,
            book_list_table: parse_selector("book_list_table", &cfg.book_list_table)?,
            record_id_param: cfg.record_id_param.clone(),
            page_timeout: cfg.request_timeout(),
            classify_timeout: cfg.classify_timeout(),
        })
    }

    /// 补全页面中的链接：
    /// - `http(s)://` 原样返回
    /// - `/` 开头拼接站点根地址
    /// - 其它拼接 `base_url + relative_link_prefix`
    pub fn absolutize(&self, href: &str) -> String {
        let href = href.trim();
        let href = href.strip_prefix('#').unwrap_or(href);
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        if href.starts_with('/') {
            return format!("{}{}", self.base_url, href);
        }
        let prefix = self.relative_link_prefix.trim();
        let prefix = if prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{prefix}")
        };
        let separator = if prefix.ends_with('/') { "" } else { "/" };
        format!("{}{}{}{}", self.base_url, prefix, separator, href)
    }

    pub fn is_catalog_entry_link(&self, href: &str) -> bool {
        self.is_book_list(href) || self.is_content_list(href)
    }

    pub fn is_book_list(&self, url: &str) -> bool {
        !self.book_list_marker.is_empty() && url.contains(&self.book_list_marker)
    }

    pub fn is_content_list(&self, url: &str) -> bool {
        !self.content_list_marker.is_empty() && url.contains(&self.content_list_marker)
    }

    pub fn is_detail(&self, url: &str) -> bool {
        !self.detail_marker.is_empty() && url.contains(&self.detail_marker)
    }

    /// 从详情页地址取出记录 ID（用于合成文件名）。
    pub fn record_id(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == self.record_id_param.as_str())
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
impl Default for SiteLayout {
    fn default() -> Self {
        Self::from_config(&Config::default()).expect("default layout")
    }
}

fn parse_selector(name: &str, raw: &str) -> Result<Selector, ConfigError> {
    Selector::parse(raw)
        .map_err(|err| ConfigError::Validation(format!("{name} 选择器无效 ({raw}): {err}")))
}

/// 元素文本：逐段去空白后拼接（与 `get_text(strip=True)` 一致）。
pub fn stripped_text(element: &scraper::ElementRef<'_>) -> String {
    element.text().map(str::trim).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SiteLayout {
        let mut cfg = Config::default();
        cfg.base_url = "http://archive.test/".to_string();
        SiteLayout::from_config(&cfg).unwrap()
    }

    #[test]
    fn absolutize_handles_three_href_shapes() {
        let site = layout();
        assert_eq!(
            site.absolutize("https://other.test/x"),
            "https://other.test/x"
        );
        assert_eq!(
            site.absolutize("/front/contentlist.do?id=1"),
            "http://archive.test/front/contentlist.do?id=1"
        );
        assert_eq!(
            site.absolutize("detail.do?recordId=7"),
            "http://archive.test/front/detail.do?recordId=7"
        );
        assert_eq!(
            site.absolutize("#/front/booklist.do"),
            "http://archive.test/front/booklist.do"
        );
    }

    #[test]
    fn markers_classify_urls() {
        let site = layout();
        assert!(site.is_catalog_entry_link("/front/booklist.do?x=1"));
        assert!(site.is_catalog_entry_link("contentlist.do?x=1"));
        assert!(!site.is_catalog_entry_link("/front/notice.do"));
        assert!(site.is_detail("detail.do?recordId=1"));
    }

    #[test]
    fn record_id_comes_from_query() {
        let site = layout();
        assert_eq!(
            site.record_id("http://archive.test/front/detail.do?a=1&recordId=ABC_01"),
            Some("ABC_01".to_string())
        );
        assert_eq!(site.record_id("http://archive.test/front/detail.do"), None);
    }

    #[test]
    fn stripped_text_joins_trimmed_fragments() {
        let html = scraper::Html::parse_fragment("<a> 월인 <b> 석보 </b>\n</a>");
        let sel = Selector::parse("a").unwrap();
        let a = html.select(&sel).next().unwrap();
        assert_eq!(stripped_text(&a), "월인석보");
    }
}
