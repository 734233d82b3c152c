mod support;

use archive_crawler::catalog_parser::{CatalogEntry, DetailResolver, PageKind, classify};

use support::{FakeSite, book_list_html, content_list_html, site, url};

#[test]
fn final_url_marker_beats_book_table_structure() {
    let pages = FakeSite::new();
    let entry = url("/front/view.do?bookId=1");
    // 重定向到内容列表地址，页面本身却是书目表格
    pages.redirect(
        &entry,
        &url("/front/contentlist.do?bookId=1"),
        &book_list_html(&[("권1", "detail.do?recordId=1")]),
    );

    assert_eq!(classify(&pages, &site(), &entry), PageKind::ContentList);
}

#[test]
fn structure_decides_when_url_is_ambiguous() {
    let pages = FakeSite::new();
    let entry = url("/front/view.do?bookId=2");
    pages.page(&entry, &content_list_html(&[("1장", "detail.do?recordId=1")]));
    assert_eq!(classify(&pages, &site(), &entry), PageKind::ContentList);

    pages.page(&entry, "<html><body><p>점검 중</p></body></html>");
    assert_eq!(classify(&pages, &site(), &entry), PageKind::Unknown);
}

#[test]
fn fetch_failure_falls_back_to_requested_url_marker() {
    let pages = FakeSite::new();
    assert_eq!(
        classify(&pages, &site(), &url("/front/booklist.do?bookId=3")),
        PageKind::BookList
    );
    assert_eq!(
        classify(&pages, &site(), &url("/front/view.do?bookId=3")),
        PageKind::Unknown
    );
}

fn book_entry(path: &str) -> CatalogEntry {
    CatalogEntry {
        kind: PageKind::BookList,
        ..CatalogEntry::new("서명", url(path))
    }
}

#[test]
fn book_list_without_content_lists_uses_direct_detail_links() {
    let pages = FakeSite::new();
    let entry = book_entry("/front/booklist.do?bookId=10");
    pages.page(
        &entry.url,
        &book_list_html(&[
            ("1권", "detail.do?recordId=D1"),
            ("해제", "/front/intro.do?bookId=10"),
            ("2권", "/front/detail.do?recordId=D2"),
        ]),
    );

    let links = DetailResolver::new(&pages, &site()).resolve(&entry);
    let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(
        urls,
        [
            "http://archive.test/front/detail.do?recordId=D1",
            "http://archive.test/front/detail.do?recordId=D2",
        ]
    );
}

#[test]
fn content_list_anchor_disables_direct_detail_fallback() {
    let pages = FakeSite::new();
    let entry = book_entry("/front/booklist.do?bookId=11");
    pages.page(
        &entry.url,
        &book_list_html(&[
            ("직접", "detail.do?recordId=DIRECT"),
            ("1권", "contentlist.do?bookId=11-v1"),
        ]),
    );
    pages.page(
        &url("/front/contentlist.do?bookId=11-v1"),
        &content_list_html(&[
            ("1장", "detail.do?recordId=V1C1"),
            ("2장", "detail.do?recordId=V1C2"),
        ]),
    );

    let links = DetailResolver::new(&pages, &site()).resolve(&entry);
    let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["1장", "2장"]);
    assert!(links.iter().all(|l| !l.url.contains("DIRECT")));
}

#[test]
fn unreachable_pages_resolve_to_empty_and_are_reported() {
    let pages = FakeSite::new();
    let entry = book_entry("/front/booklist.do?bookId=12");
    pages.page(
        &entry.url,
        &book_list_html(&[("1권", "contentlist.do?bookId=12-v1")]),
    );
    pages.unstable(&url("/front/contentlist.do?bookId=12-v1"));

    let report = DetailResolver::new(&pages, &site()).resolve_with_report(&entry);
    assert!(report.links.is_empty());
    assert_eq!(report.unreachable_pages, 1);
}

#[test]
fn missing_pages_resolve_to_empty_without_being_unreachable() {
    let pages = FakeSite::new();
    let entry = book_entry("/front/booklist.do?bookId=14");
    pages.page(
        &entry.url,
        &book_list_html(&[("1권", "contentlist.do?bookId=14-v1")]),
    );

    let report = DetailResolver::new(&pages, &site()).resolve_with_report(&entry);
    assert!(report.links.is_empty());
    assert_eq!(report.unreachable_pages, 0);
}

#[test]
fn duplicates_are_kept_in_document_order() {
    let pages = FakeSite::new();
    let entry = CatalogEntry {
        kind: PageKind::ContentList,
        ..CatalogEntry::new("중복", url("/front/contentlist.do?bookId=13"))
    };
    pages.page(
        &entry.url,
        &content_list_html(&[
            ("가", "detail.do?recordId=X"),
            ("나", "detail.do?recordId=Y"),
            ("가", "detail.do?recordId=X"),
        ]),
    );

    let links = DetailResolver::new(&pages, &site()).resolve(&entry);
    let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["가", "나", "가"]);
}
