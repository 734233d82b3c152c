//! 已完成条目记录（Ledger）。
//!
//! 纯文本，每行一个目录标题，UTF-8，只追加不改写。读失败视为“无历史进度”，
//! 写失败只记日志，不中断爬取。

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("title contains a line break and cannot be recorded: {0:?}")]
    UnsupportedTitle(String),
}

#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    completed: HashSet<String>,
    degraded: bool,
}

impl ProgressLedger {
    /// 打开并立即加载记录文件。
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut ledger = Self {
            path: path.into(),
            completed: HashSet::new(),
            degraded: false,
        };
        ledger.load();
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部已完成标题；文件不存在时创建空文件。
    pub fn load(&mut self) -> HashSet<String> {
        match read_titles(&self.path) {
            Ok(titles) => {
                self.degraded = false;
                self.completed = titles;
                debug!(
                    target: "ledger",
                    "读取完成记录 {} 条: {}",
                    self.completed.len(),
                    self.path.display()
                );
            }
            Err(err) => {
                warn!(target: "ledger", "读取完成记录失败，按无历史进度处理: {err}");
                self.degraded = true;
                self.completed.clear();
            }
        }
        self.completed.clone()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.completed.contains(title)
    }

    pub fn titles(&self) -> &HashSet<String> {
        &self.completed
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// 本次运行是否处于无法保证续传的降级状态。
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 记录一个已完成标题；已存在时不重复写入。
    ///
    /// 返回是否确实追加了新行。写失败只记日志。
    pub fn mark_complete(&mut self, title: &str) -> bool {
        match self.try_mark_complete(title) {
            Ok(appended) => appended,
            Err(err) => {
                warn!(target: "ledger", "完成记录写入失败（本次进度可能丢失）: {err}");
                self.degraded = true;
                false
            }
        }
    }

    pub fn try_mark_complete(&mut self, title: &str) -> Result<bool, LedgerError> {
        let title = title.trim();
        if title.contains(['\n', '\r']) {
            return Err(LedgerError::UnsupportedTitle(title.to_string()));
        }
        if title.is_empty() {
            return Ok(false);
        }

        // 以磁盘内容为准，避免内存状态与文件不一致时重复追加
        let on_disk = read_titles(&self.path).unwrap_or_default();
        if on_disk.contains(title) {
            self.completed.insert(title.to_string());
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;

        let needs_newline = fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
            && !ends_with_newline(&self.path);
        let line = if needs_newline {
            format!("\n{title}\n")
        } else {
            format!("{title}\n")
        };
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| self.io_error(source))?;

        self.completed.insert(title.to_string());
        info!(target: "ledger", "已记录完成: {title}");
        Ok(true)
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn read_titles(path: &Path) -> Result<HashSet<String>, LedgerError> {
    let to_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(to_err)?;
        return Ok(HashSet::new());
    }

    let raw = fs::read_to_string(path).map_err(to_err)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn ends_with_newline(path: &Path) -> bool {
    fs::read(path)
        .map(|bytes| bytes.last() == Some(&b'\n'))
        .unwrap_or(true)
}
