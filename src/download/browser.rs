//! 浏览器能力抽象与会话生命周期。
//!
//! 下载器只通过 `BrowserSession` 操作浏览器，具体实现可替换（测试中使用内存假实现）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },
    #[error("no download started within {0:?}")]
    DownloadTimeout(Duration),
    #[error("download canceled by browser: {0}")]
    DownloadCanceled(String),
    #[error("browser event stream closed")]
    EventStreamClosed,
    #[error("browser session already closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 页面上找到的可见下载控件（以命中的选择器标识）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleControl {
    pub selector: String,
}

/// 浏览器完成的一次下载。
#[derive(Debug, Clone, Default)]
pub struct BrowserDownload {
    /// 浏览器建议的文件名。
    pub suggested_filename: Option<String>,
    /// 浏览器内部临时下载文件位置。
    pub temp_path: Option<PathBuf>,
    /// 浏览器报告的已接收字节数。
    pub reported_bytes: Option<u64>,
}

/// 单页浏览器会话。所有调用顺序执行，每一步自带超时。
pub trait BrowserSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// 查找第一个匹配 `selector` 且可见的元素。
    fn find_visible_control(
        &mut self,
        selector: &str,
    ) -> Result<Option<VisibleControl>, BrowserError>;

    /// 点击控件并等待浏览器原生下载完成。
    fn await_download(
        &mut self,
        control: &VisibleControl,
        timeout: Duration,
    ) -> Result<BrowserDownload, BrowserError>;

    /// 控件的原始 href。
    fn control_href(&mut self, control: &VisibleControl) -> Result<Option<String>, BrowserError>;

    /// 在新标签页中直接打开地址触发下载。
    fn download_in_new_tab(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<BrowserDownload, BrowserError>;

    /// 将下载结果复制到 `dest`，返回写入的字节数。
    fn save_download(&mut self, download: &BrowserDownload, dest: &Path)
    -> Result<u64, BrowserError>;

    fn close(&mut self) -> Result<(), BrowserError>;
}

pub type SessionLauncher = Box<dyn FnMut() -> Result<Box<dyn BrowserSession>, BrowserError>>;

/// 浏览器会话槽位：首次使用时启动，进程内只关闭一次。
pub struct BrowserSlot {
    launcher: SessionLauncher,
    session: Option<Box<dyn BrowserSession>>,
    launches: usize,
    closed: bool,
}

impl BrowserSlot {
    pub fn new(launcher: SessionLauncher) -> Self {
        Self {
            launcher,
            session: None,
            launches: 0,
            closed: false,
        }
    }

    /// 取得会话，必要时启动浏览器。
    pub fn session(&mut self) -> Result<&mut dyn BrowserSession, BrowserError> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        if self.session.is_none() {
            info!(target: "browser", "启动浏览器");
            let session = (self.launcher)()?;
            self.launches += 1;
            return Ok(self.session.insert(session).as_mut());
        }
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(BrowserError::Closed),
        }
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    pub fn launches(&self) -> usize {
        self.launches
    }

    /// 关闭浏览器；重复调用无副作用。
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut session) = self.session.take() {
            match session.close() {
                Ok(()) => info!(target: "browser", "浏览器已关闭"),
                Err(err) => warn!(target: "browser", "关闭浏览器失败: {err}"),
            }
        } else {
            debug!(target: "browser", "浏览器未启动，无需关闭");
        }
    }
}

impl Drop for BrowserSlot {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counting {
        closes: Rc<Cell<usize>>,
    }

    impl BrowserSession for Counting {
        fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
            Ok(())
        }
        fn find_visible_control(
            &mut self,
            _selector: &str,
        ) -> Result<Option<VisibleControl>, BrowserError> {
            Ok(None)
        }
        fn await_download(
            &mut self,
            _control: &VisibleControl,
            timeout: Duration,
        ) -> Result<BrowserDownload, BrowserError> {
            Err(BrowserError::DownloadTimeout(timeout))
        }
        fn control_href(
            &mut self,
            _control: &VisibleControl,
        ) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }
        fn download_in_new_tab(
            &mut self,
            _url: &str,
            timeout: Duration,
        ) -> Result<BrowserDownload, BrowserError> {
            Err(BrowserError::DownloadTimeout(timeout))
        }
        fn save_download(
            &mut self,
            _download: &BrowserDownload,
            _dest: &Path,
        ) -> Result<u64, BrowserError> {
            Ok(0)
        }
        fn close(&mut self) -> Result<(), BrowserError> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    fn slot(closes: &Rc<Cell<usize>>) -> BrowserSlot {
        let closes = Rc::clone(closes);
        BrowserSlot::new(Box::new(move || {
            Ok(Box::new(Counting {
                closes: Rc::clone(&closes),
            }) as Box<dyn BrowserSession>)
        }))
    }

    #[test]
    fn launches_lazily_once() {
        let closes = Rc::new(Cell::new(0));
        let mut slot = slot(&closes);
        assert!(!slot.is_started());
        slot.session().unwrap();
        slot.session().unwrap();
        assert_eq!(slot.launches(), 1);
    }

    #[test]
    fn closes_exactly_once() {
        let closes = Rc::new(Cell::new(0));
        {
            let mut slot = slot(&closes);
            slot.session().unwrap();
            slot.shutdown();
            slot.shutdown();
            assert!(matches!(slot.session(), Err(BrowserError::Closed)));
        }
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn unused_slot_never_launches() {
        let closes = Rc::new(Cell::new(0));
        drop(slot(&closes));
        assert_eq!(closes.get(), 0);
    }
}
