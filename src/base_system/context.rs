//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `crawler.yml` 的字段元信息。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 站点配置
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    #[serde(default = "default_relative_link_prefix")]
    pub relative_link_prefix: String,

    // 路径配置
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
    #[serde(default)]
    pub temp_download_dir: String,

    // 网络配置
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_request_gap_ms")]
    pub request_gap_ms: u64,

    // 浏览器配置
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_save_wait_ms")]
    pub save_wait_ms: u64,
    #[serde(default = "default_link_delay_ms")]
    pub link_delay_ms: u64,
    #[serde(default = "default_entry_delay_ms")]
    pub entry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_executable: String,
    #[serde(default = "default_download_selectors")]
    pub download_selectors: Vec<String>,

    // 页面结构配置
    #[serde(default = "default_catalog_table_selector")]
    pub catalog_table_selector: String,
    #[serde(default = "default_catalog_title_cell")]
    pub catalog_title_cell: usize,
    #[serde(default = "default_book_list_marker")]
    pub book_list_marker: String,
    #[serde(default = "default_content_list_marker")]
    pub content_list_marker: String,
    #[serde(default = "default_detail_marker")]
    pub detail_marker: String,
    #[serde(default = "default_content_list_container")]
    pub content_list_container: String,
    #[serde(default = "default_book_list_table")]
    pub book_list_table: String,
    #[serde(default = "default_record_id_param")]
    pub record_id_param: String,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    // 界面配置
    #[serde(default = "default_true")]
    pub show_progress: bool,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            catalog_path: default_catalog_path(),
            relative_link_prefix: default_relative_link_prefix(),
            download_dir: default_download_dir(),
            ledger_file: default_ledger_file(),
            temp_download_dir: String::new(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            classify_timeout: default_classify_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            request_gap_ms: default_request_gap_ms(),
            navigation_timeout: default_navigation_timeout(),
            download_timeout: default_download_timeout(),
            settle_delay_ms: default_settle_delay_ms(),
            save_wait_ms: default_save_wait_ms(),
            link_delay_ms: default_link_delay_ms(),
            entry_delay_ms: default_entry_delay_ms(),
            headless: default_true(),
            chrome_executable: String::new(),
            download_selectors: default_download_selectors(),
            catalog_table_selector: default_catalog_table_selector(),
            catalog_title_cell: default_catalog_title_cell(),
            book_list_marker: default_book_list_marker(),
            content_list_marker: default_content_list_marker(),
            detail_marker: default_detail_marker(),
            content_list_container: default_content_list_container(),
            book_list_table: default_book_list_table(),
            record_id_param: default_record_id_param(),
            artifact_extension: default_artifact_extension(),
            show_progress: default_true(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "crawler.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 32] = [
            FieldMeta {
                name: "base_url",
                description: "站点根地址（协议 + 域名）",
            },
            FieldMeta {
                name: "catalog_path",
                description: "总目录分页地址（相对 base_url）",
            },
            FieldMeta {
                name: "relative_link_prefix",
                description: "既非绝对地址也非 / 开头的链接所补的前缀",
            },
            FieldMeta {
                name: "download_dir",
                description: "文档保存目录（相对数据目录）",
            },
            FieldMeta {
                name: "ledger_file",
                description: "已完成条目记录文件（每行一个标题，只追加）",
            },
            FieldMeta {
                name: "temp_download_dir",
                description: "浏览器临时下载目录的上级目录，留空使用系统临时目录",
            },
            FieldMeta {
                name: "user_agent",
                description: "HTTP 请求与浏览器使用的 User-Agent",
            },
            FieldMeta {
                name: "request_timeout",
                description: "静态页面请求超时时间（秒）",
            },
            FieldMeta {
                name: "classify_timeout",
                description: "链接类型判定请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "网络瞬时错误的最大尝试次数",
            },
            FieldMeta {
                name: "retry_base_delay_ms",
                description: "首次退避等待, 单位ms（每次翻倍）",
            },
            FieldMeta {
                name: "retry_max_delay_ms",
                description: "退避等待上限, 单位ms",
            },
            FieldMeta {
                name: "request_gap_ms",
                description: "两次静态请求之间的最小间隔, 单位ms",
            },
            FieldMeta {
                name: "navigation_timeout",
                description: "浏览器页面导航超时时间（秒）",
            },
            FieldMeta {
                name: "download_timeout",
                description: "等待浏览器下载事件的超时时间（秒）",
            },
            FieldMeta {
                name: "settle_delay_ms",
                description: "页面加载后的稳定等待, 单位ms",
            },
            FieldMeta {
                name: "save_wait_ms",
                description: "文件保存后校验前的等待, 单位ms",
            },
            FieldMeta {
                name: "link_delay_ms",
                description: "相邻两个下载之间的间隔, 单位ms",
            },
            FieldMeta {
                name: "entry_delay_ms",
                description: "相邻两个目录条目之间的间隔, 单位ms",
            },
            FieldMeta {
                name: "headless",
                description: "是否以无头模式运行浏览器",
            },
            FieldMeta {
                name: "chrome_executable",
                description: "浏览器可执行文件路径，留空自动探测",
            },
            FieldMeta {
                name: "download_selectors",
                description: "下载按钮选择器（按顺序尝试，取第一个可见的）",
            },
            FieldMeta {
                name: "catalog_table_selector",
                description: "总目录表格选择器（取第一个匹配）",
            },
            FieldMeta {
                name: "catalog_title_cell",
                description: "总目录中标题链接所在列（从 0 开始）",
            },
            FieldMeta {
                name: "book_list_marker",
                description: "书目列表页 URL 标记",
            },
            FieldMeta {
                name: "content_list_marker",
                description: "内容列表页 URL 标记",
            },
            FieldMeta {
                name: "detail_marker",
                description: "详情页 URL 标记",
            },
            FieldMeta {
                name: "content_list_container",
                description: "内容列表页嵌套列表容器选择器",
            },
            FieldMeta {
                name: "book_list_table",
                description: "书目列表页表格选择器",
            },
            FieldMeta {
                name: "record_id_param",
                description: "生成文件名时使用的查询参数",
            },
            FieldMeta {
                name: "artifact_extension",
                description: "生成文件名时使用的扩展名",
            },
            FieldMeta {
                name: "show_progress",
                description: "是否显示每个条目的下载进度条",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), String> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err("base_url 不能为空".to_string());
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(format!("base_url 必须以 http:// 或 https:// 开头: {base}"));
        }
        if self.download_selectors.iter().all(|s| s.trim().is_empty()) {
            return Err("download_selectors 至少需要一个选择器".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries 必须大于 0".to_string());
        }
        for (name, selector) in [
            ("catalog_table_selector", &self.catalog_table_selector),
            ("content_list_container", &self.content_list_container),
            ("book_list_table", &self.book_list_table),
        ] {
            if scraper::Selector::parse(selector).is_err() {
                return Err(format!("{name} 不是合法的 CSS 选择器: {selector}"));
            }
        }
        Ok(())
    }
}

impl Config {
    /// 相对路径以此目录为基准；未设置时使用当前目录。
    pub fn with_base_dir(mut self, base_dir: Option<&Path>) -> Self {
        self.base_dir = base_dir.map(Path::to_path_buf);
        self
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn download_root(&self) -> PathBuf {
        self.resolve(&self.download_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger_file)
    }

    pub fn temp_download_parent(&self) -> Option<PathBuf> {
        let raw = self.temp_download_dir.trim();
        (!raw.is_empty()).then(|| self.resolve(raw))
    }

    pub fn chrome_executable(&self) -> Option<PathBuf> {
        let raw = self.chrome_executable.trim();
        (!raw.is_empty()).then(|| PathBuf::from(raw))
    }

    pub fn catalog_url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let path = self.catalog_path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout.max(1))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout.max(1))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout.max(1))
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw.trim());
        if path.is_absolute() {
            path
        } else {
            self.base_dir().join(path)
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://db.sejongkorea.org".to_string()
}

fn default_catalog_path() -> String {
    "/front/chron.do?type=db&currentPage=1&recordsPerPage=100&cate=table".to_string()
}

fn default_relative_link_prefix() -> String {
    "/front/".to_string()
}

fn default_download_dir() -> String {
    "세종 한글 고전".to_string()
}

fn default_ledger_file() -> String {
    "downloaded_classic.txt".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_classify_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    8000
}

fn default_request_gap_ms() -> u64 {
    300
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_save_wait_ms() -> u64 {
    500
}

fn default_link_delay_ms() -> u64 {
    500
}

fn default_entry_delay_ms() -> u64 {
    1000
}

fn default_download_selectors() -> Vec<String> {
    vec![
        "a.btn_down".to_string(),
        "a[class*=\"btn_down\"]".to_string(),
        "a[href*=\"down\"]".to_string(),
        ".btn_down".to_string(),
    ]
}

fn default_catalog_table_selector() -> String {
    "table".to_string()
}

fn default_catalog_title_cell() -> usize {
    1
}

fn default_book_list_marker() -> String {
    "booklist.do".to_string()
}

fn default_content_list_marker() -> String {
    "contentlist.do".to_string()
}

fn default_detail_marker() -> String {
    "detail.do".to_string()
}

fn default_content_list_container() -> String {
    "ul.dep_01".to_string()
}

fn default_book_list_table() -> String {
    "table.bookListTable".to_string()
}

fn default_record_id_param() -> String {
    "recordId".to_string()
}

fn default_artifact_extension() -> String {
    "xml".to_string()
}
