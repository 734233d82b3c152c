//! 档案站点目录爬虫与浏览器驱动下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置 / 日志 / 重试 / 完成记录 / 文件名等基础设施
//! - `network_parser`：静态页面抓取与站点结构
//! - `catalog_parser`：总目录、类型判定与详情页展开
//! - `download`：浏览器下载与爬取主流程

pub mod base_system;
pub mod catalog_parser;
pub mod download;
pub mod network_parser;
