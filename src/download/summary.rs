//! 运行汇总与落盘文件统计。

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog_parser::models::EntryState;

#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub processed: usize,
    pub complete: usize,
    pub empty_complete: usize,
    pub partial_failure: usize,
    pub unknown: usize,
    /// 仅展开未下载（dry run）。
    pub resolved_only: usize,
    pub links_attempted: usize,
    pub links_succeeded: usize,
    pub interrupted: bool,
}

impl CrawlSummary {
    pub fn record_entry(&mut self, state: EntryState) {
        self.processed += 1;
        match state {
            EntryState::Complete => self.complete += 1,
            EntryState::EmptyComplete => self.empty_complete += 1,
            EntryState::Resolved => self.resolved_only += 1,
            _ => self.partial_failure += 1,
        }
    }

    pub fn links_failed(&self) -> usize {
        self.links_attempted.saturating_sub(self.links_succeeded)
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== 爬取汇总 ====")?;
        writeln!(
            f,
            "目录条目: {} (已完成跳过 {}, 本次处理 {})",
            self.discovered, self.skipped, self.processed
        )?;
        writeln!(
            f,
            "完成: {}  空条目: {}  未完成: {} (其中类型未知 {})",
            self.complete, self.empty_complete, self.partial_failure, self.unknown
        )?;
        if self.resolved_only > 0 {
            writeln!(f, "仅展开未下载: {}", self.resolved_only)?;
        }
        write!(
            f,
            "文档: 尝试 {}  成功 {}  失败 {}",
            self.links_attempted,
            self.links_succeeded,
            self.links_failed()
        )?;
        if self.interrupted {
            write!(f, "\n（收到停止信号，提前结束）")?;
        }
        Ok(())
    }
}

/// 下载目录中各条目目录的文档数量与总字节数。
#[derive(Debug, Default, Clone, Serialize)]
pub struct ArtifactReport {
    pub per_directory: BTreeMap<String, usize>,
    pub total_files: usize,
    pub total_bytes: u64,
}

impl ArtifactReport {
    /// 扫描 `root` 下一层目录中扩展名为 `extension` 的文件。根目录不存在时返回空报告。
    pub fn scan(root: &Path, extension: &str) -> Self {
        let mut report = Self::default();
        let Ok(dirs) = fs::read_dir(root) else {
            return report;
        };
        for dir in dirs.flatten() {
            let path = dir.path();
            if !path.is_dir() {
                continue;
            }
            let name = dir.file_name().to_string_lossy().into_owned();
            let (count, bytes) = count_artifacts(&path, extension);
            report.per_directory.insert(name, count);
            report.total_files += count;
            report.total_bytes += bytes;
        }
        report
    }

    pub fn empty_directories(&self) -> Vec<&str> {
        self.per_directory
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn log(&self, root: &Path) {
        info!(
            target: "report",
            "{} 下共 {} 个目录，{} 个文档，{:.2} MB",
            root.display(),
            self.per_directory.len(),
            self.total_files,
            self.total_bytes as f64 / 1024.0 / 1024.0
        );
        for name in self.empty_directories() {
            warn!(target: "report", "目录中没有文档: {name}");
        }
    }
}

fn count_artifacts(dir: &Path, extension: &str) -> (usize, u64) {
    let Ok(entries) = fs::read_dir(dir) else {
        return (0, 0);
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extension))
        .fold((0, 0), |(count, bytes), p: PathBuf| {
            let size = fs::metadata(&p).map(|m| m.len()).unwrap_or(0);
            (count + 1, bytes + size)
        })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}
