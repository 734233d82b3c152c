//! 详情链接展开：把书目列表 / 内容列表页展开为扁平的详情页列表。
//!
//! 结果为深度优先的文档顺序，不去重。任何页面取不到都只记警告，
//! 该页贡献空结果。

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::models::{CatalogEntry, DetailLink, PageKind};
use crate::network_parser::PageFetcher;
use crate::network_parser::site::{SiteLayout, stripped_text};

/// 展开结果，附带因瞬时错误取不到的页面数（用于区分“确实为空”与“没取到”）。
/// 404 或无法解析的页面按空结果处理，不计入。
#[derive(Debug, Default, Clone)]
pub struct ResolvedLinks {
    pub links: Vec<DetailLink>,
    pub unreachable_pages: usize,
}

pub struct DetailResolver<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    site: &'a SiteLayout,
}

impl<'a, F: PageFetcher + ?Sized> DetailResolver<'a, F> {
    pub fn new(fetcher: &'a F, site: &'a SiteLayout) -> Self {
        Self { fetcher, site }
    }

    pub fn resolve(&self, entry: &CatalogEntry) -> Vec<DetailLink> {
        self.resolve_with_report(entry).links
    }

    pub fn resolve_with_report(&self, entry: &CatalogEntry) -> ResolvedLinks {
        let mut out = ResolvedLinks::default();
        match entry.kind {
            PageKind::ContentList => self.expand_content_list(&entry.url, &mut out),
            PageKind::BookList => self.expand_book_list(&entry.url, &mut out),
            PageKind::Unknown => {
                warn!(target: "resolve", "未知页面类型，不展开: {}", entry.title);
            }
        }
        debug!(
            target: "resolve",
            "{} 展开得到 {} 个详情页（{} 个页面未取到）",
            entry.title,
            out.links.len(),
            out.unreachable_pages
        );
        out
    }

    fn load(&self, url: &str, out: &mut ResolvedLinks) -> Option<Html> {
        match self.fetcher.fetch(url, self.site.page_timeout) {
            Ok(page) => Some(Html::parse_document(&page.body)),
            Err(err) if err.is_transient() => {
                warn!(target: "resolve", "页面暂时取不到，按空结果处理: {err}");
                out.unreachable_pages += 1;
                None
            }
            Err(err) => {
                warn!(target: "resolve", "页面不存在或无法解析，按空结果处理: {err}");
                None
            }
        }
    }

    fn expand_content_list(&self, url: &str, out: &mut ResolvedLinks) {
        if let Some(doc) = self.load(url, out) {
            out.links.extend(content_list_links(&doc, self.site));
        }
    }

    fn expand_book_list(&self, url: &str, out: &mut ResolvedLinks) {
        let Some(doc) = self.load(url, out) else {
            return;
        };
        let anchors = book_list_anchors(&doc, self.site);

        let mut content_list_found = false;
        for (title, href) in &anchors {
            if self.site.is_content_list(href) {
                content_list_found = true;
                info!(target: "resolve", "  展开分卷页: {title}");
                self.expand_content_list(href, out);
            }
        }

        // 整页没有任何分卷链接时才直接收集详情链接
        if !content_list_found {
            debug!(target: "resolve", "没有分卷链接，直接查找详情链接: {url}");
            out.links.extend(
                anchors
                    .into_iter()
                    .filter(|(_, href)| self.site.is_detail(href))
                    .map(|(title, href)| DetailLink::new(title, href)),
            );
        }
    }
}

/// 内容列表页：在每个嵌套列表容器中只处理不再包含子列表的 `ul`，
/// 每个 `li` 取第一个带 href 的链接，且必须是详情页地址。
///
/// 容器本身没有任何子 `ul` 时，容器即视为叶子列表。
pub fn content_list_links(doc: &Html, site: &SiteLayout) -> Vec<DetailLink> {
    let (Ok(ul_sel), Ok(li_sel), Ok(a_sel)) = (
        Selector::parse("ul"),
        Selector::parse("li"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for container in doc.select(&site.content_list_container) {
        let nested: Vec<ElementRef<'_>> = container.select(&ul_sel).collect();
        let leaves: Vec<ElementRef<'_>> = if nested.is_empty() {
            vec![container]
        } else {
            nested
                .into_iter()
                .filter(|ul| ul.select(&ul_sel).next().is_none())
                .collect()
        };

        for leaf in leaves {
            for li in leaf.select(&li_sel) {
                let Some(anchor) = li.select(&a_sel).next() else {
                    continue;
                };
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                if site.is_detail(href) {
                    links.push(DetailLink::new(stripped_text(&anchor), site.absolutize(href)));
                }
            }
        }
    }
    links
}

/// 书目列表页：第一个书目表格的 `tbody` 中全部带 href 的链接（已补全为绝对地址）。
pub fn book_list_anchors(doc: &Html, site: &SiteLayout) -> Vec<(String, String)> {
    let (Ok(body_sel), Ok(a_sel)) = (Selector::parse("tbody"), Selector::parse("a[href]")) else {
        return Vec::new();
    };
    let Some(table) = doc.select(&site.book_list_table).next() else {
        return Vec::new();
    };
    let Some(body) = table.select(&body_sel).next() else {
        return Vec::new();
    };

    body.select(&a_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((stripped_text(&a), site.absolutize(href)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = r#"
        <ul class="dep_01">
          <li>권1
            <ul>
              <li>장1
                <ul>
                  <li><a href="detail.do?recordId=A1">A1</a></li>
                  <li><a href="/front/detail.do?recordId=A2">A2</a></li>
                </ul>
              </li>
            </ul>
          </li>
          <li>권2
            <ul>
              <li><a href="list.do?x=1">목차</a></li>
              <li><span>no link</span></li>
              <li><a href="detail.do?recordId=B1">B1</a><a href="detail.do?recordId=B1x">B1x</a></li>
            </ul>
          </li>
        </ul>"#;

    #[test]
    fn content_list_takes_leaf_lists_only() {
        let doc = Html::parse_document(NESTED);
        let links = content_list_links(&doc, &SiteLayout::default());
        let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, ["A1", "A2", "B1"]);
        assert_eq!(
            links[0].url,
            "http://db.sejongkorea.org/front/detail.do?recordId=A1"
        );
    }

    #[test]
    fn flat_container_is_its_own_leaf() {
        let doc = Html::parse_document(
            r#"<ul class="dep_01"><li><a href="detail.do?recordId=1">하나</a></li></ul>"#,
        );
        let links = content_list_links(&doc, &SiteLayout::default());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "하나");
    }

    #[test]
    fn book_list_anchors_come_from_table_body() {
        let doc = Html::parse_document(
            r#"<table class="bookListTable">
                 <thead><tr><th><a href="/front/booklist.do?sort=1">정렬</a></th></tr></thead>
                 <tbody><tr><td><a href="contentlist.do?id=1">권1</a></td>
                            <td><a href="detail.do?recordId=9">바로</a></td></tr></tbody>
               </table>"#,
        );
        let anchors = book_list_anchors(&doc, &SiteLayout::default());
        assert_eq!(
            anchors,
            vec![
                (
                    "권1".to_string(),
                    "http://db.sejongkorea.org/front/contentlist.do?id=1".to_string()
                ),
                (
                    "바로".to_string(),
                    "http://db.sejongkorea.org/front/detail.do?recordId=9".to_string()
                ),
            ]
        );
    }
}
