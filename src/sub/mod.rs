//! 订阅生成
//!
//! - `service`: 链接订阅（每个客户端一条原始链接和一条替换主机后的链接）
//! - `json`: Xray 客户端 JSON 配置订阅
//! - `link`: 各协议分享链接的渲染
//! - `remark`: 链接备注
//! - `inbound`: 入站设置解析

pub mod inbound;
pub mod json;
pub mod link;
pub mod remark;
pub mod service;

pub use json::SubJsonService;
pub use service::SubService;

use thiserror::Error;

/// 订阅生成错误
#[derive(Debug, Error)]
pub enum SubError {
    #[error("未找到订阅: {0}")]
    NotFound(String),

    #[error("读取订阅数据失败: {0}")]
    Storage(#[from] anyhow::Error),
}

/// 单个客户端链接渲染错误，调用方跳过该客户端
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("不支持的协议: {0}")]
    UnsupportedProtocol(String),

    #[error("入站中未找到客户端: {0}")]
    ClientNotFound(String),

    #[error("入站设置格式错误: {0}")]
    InvalidSettings(#[from] serde_json::Error),
}
