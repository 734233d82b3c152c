//! 文件名 / 目录名处理：标题规范化、非法字符替换、同名目录去重。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const MAX_TITLE_CHARS: usize = 150;
const UNTITLED: &str = "무제";

/// Windows / POSIX 文件名中不允许出现的字符。
pub const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// 将任意字符串转换为可安全用作文件名的形式。
///
/// 非法字符与控制字符替换为 `replacement`，去掉结尾的空格与点，
/// 规避保留设备名，并在字符边界处按字节数截断。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let replacement = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .chars()
        .map(|ch| {
            if FORBIDDEN_CHARS.contains(&ch) || ch.is_control() {
                replacement
            } else {
                ch
            }
        })
        .collect();

    let leading = cleaned.len() - cleaned.trim_start().len();
    cleaned.drain(..leading);
    trim_trailing(&mut cleaned);

    if cleaned.len() > max_len {
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        trim_trailing(&mut cleaned);
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = cleaned.split('.').next().unwrap_or_default().to_uppercase();
    if RESERVED.contains(&stem.as_str()) {
        cleaned.insert(0, replacement);
    }

    cleaned
}

/// 文档文件名：非法字符一律替换为 `_`。
pub fn sanitize_filename(name: &str) -> String {
    safe_fs_name(name, "_", 200)
}

fn trim_trailing(s: &mut String) {
    while s.ends_with(' ') || s.ends_with('.') {
        s.pop();
    }
}

fn zero_width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{200B}-\u{200F}\u{FEFF}]").expect("static regex"))
}

/// 目录标题规范化：NFKC、去零宽与控制字符、压缩空白、限制长度。
pub fn normalize_title(title: &str) -> String {
    let nfkc: String = title.nfkc().collect();
    let without_zw = zero_width_re().replace_all(&nfkc, "");
    let visible: String = without_zw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = visible.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return UNTITLED.to_string();
    }
    collapsed.chars().take(MAX_TITLE_CHARS).collect()
}

/// 条目标题对应的目录名（规范化后再做文件名安全处理）。
pub fn entry_folder_name(title: &str) -> String {
    safe_fs_name(&normalize_title(title), "_", 180)
}

/// 一次爬取内的同名目录计数。
///
/// 第一次出现的名字原样返回，之后依次返回 `name(2)`、`name(3)`……
#[derive(Debug, Default)]
pub struct TitleRegistry {
    seen: HashMap<String, usize>,
}

impl TitleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            name.to_string()
        } else {
            format!("{name}({count})")
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
