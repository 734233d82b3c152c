//! 目录解析模块入口。
//!
//! 子模块：
//! - `models`     — 数据模型（CatalogEntry / DetailLink / PageKind 等）
//! - `discovery`  — 总目录抓取与完成记录过滤
//! - `classifier` — 条目链接类型判定
//! - `resolver`   — 书目 / 内容列表展开为详情页

pub mod classifier;
pub mod discovery;
pub mod models;
pub mod resolver;

pub use classifier::classify;
pub use discovery::{CatalogListing, fetch_catalog};
pub use models::{CatalogEntry, DetailLink, DownloadOutcome, EntryState, PageKind};
pub use resolver::{DetailResolver, ResolvedLinks};
