use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use super::{FetchError, FetchedPage, PageFetcher};
use crate::base_system::context::Config;
use crate::base_system::retry::Backoff;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub min_request_gap: Duration,
    pub backoff: Backoff,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string(),
            request_timeout: Duration::from_secs(30),
            min_request_gap: Duration::from_millis(300),
            backoff: Backoff::default(),
        }
    }
}

impl HttpClientConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            request_timeout: cfg.request_timeout(),
            min_request_gap: Duration::from_millis(cfg.request_gap_ms),
            backoff: Backoff::new(
                cfg.max_retries as usize,
                Duration::from_millis(cfg.retry_base_delay_ms),
                Duration::from_millis(cfg.retry_max_delay_ms),
            ),
        }
    }
}

/// 档案站点静态页面客户端：跟随重定向、节流、瞬时错误退避重试。
pub struct ArchiveHttpClient {
    client: Client,
    config: HttpClientConfig,
    last_request: Mutex<Option<Instant>>,
}

impl ArchiveHttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        default_headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"),
        );

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        headers
    }

    fn throttle(&self) {
        let gap = self.config.min_request_gap;
        if gap.is_zero() {
            return;
        }
        if let Ok(mut last) = self.last_request.lock() {
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < gap {
                    std::thread::sleep(gap - elapsed);
                }
            }
            *last = Some(Instant::now());
        }
    }

    fn fetch_once(&self, url: &str, timeout: Duration, attempt: usize) -> Result<FetchedPage, FetchError> {
        self.throttle();
        debug!(target: "network", "GET {url} (第 {attempt} 次)");

        let transient = |reason: String| FetchError::Transient {
            url: url.to_string(),
            attempts: attempt,
            reason,
        };

        let resp = self
            .client
            .get(url)
            .headers(self.headers())
            .timeout(timeout)
            .send()
            .map_err(|e| transient(e.to_string()))?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            return Err(transient(format!("HTTP {}", status.as_u16())));
        }
        if status.is_client_error() {
            return Err(FetchError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().map_err(|e| transient(e.to_string()))?;
        // 站点页面均为 UTF-8，忽略错误声明的 charset
        let body = String::from_utf8_lossy(&bytes).into_owned();
        if body.trim().is_empty() {
            return Err(FetchError::Malformed {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

impl PageFetcher for ArchiveHttpClient {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let result = self.config.backoff.run(
            url,
            |attempt| self.fetch_once(url, timeout, attempt),
            FetchError::is_transient,
        );
        if let Err(err) = &result {
            warn!(target: "network", "请求失败: {err}");
        }
        result
    }
}
