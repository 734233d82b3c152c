//! 条目下载进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 单个目录条目的 CLI 进度条；关闭或无链接时不绘制。
pub(crate) struct EntryProgress {
    bar: Option<ProgressBar>,
}

impl EntryProgress {
    pub(crate) fn new(enabled: bool, title: &str, total: usize) -> Self {
        if !enabled || total == 0 {
            return Self { bar: None };
        }

        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        bar.set_style(style);
        bar.set_prefix(title.chars().take(24).collect::<String>());
        Self { bar: Some(bar) }
    }

    pub(crate) fn set_message(&self, msg: &str) {
        if let Some(bar) = self.bar.as_ref() {
            bar.set_message(msg.to_string());
        }
    }

    pub(crate) fn inc(&self) {
        if let Some(bar) = self.bar.as_ref() {
            bar.inc(1);
        }
    }

    /// 在进度条上方输出一行，不打断绘制。
    pub(crate) fn println(&self, line: &str) {
        if let Some(bar) = self.bar.as_ref() {
            bar.println(line);
        }
    }

    pub(crate) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for EntryProgress {
    fn drop(&mut self) {
        self.finish();
    }
}
