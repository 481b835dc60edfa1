//! 错误类型
//!
//! 路由器对外契约是「永远返回文本」：这里的错误只在组件内部流转，
//! 在各自边界被转换成对话回复（分类未命中、本地处理失败、代理不可达、
//! 代理超时、过期回复各有固定文案），不会作为异常抛给调用方。

use thiserror::Error;

/// 任务存储读写错误（本地执行器边界内消化）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialize error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

/// 代理桥接错误（Bridge 边界内消化）
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 外部代理进程不可达（连接失败、DNS 等）
    #[error("Agent unreachable: {0}")]
    Unreachable(String),

    /// 代理返回了非成功状态码
    #[error("Agent returned status {0}")]
    BadStatus(u16),

    /// 代理响应体无法解析
    #[error("Invalid agent reply: {0}")]
    InvalidReply(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Unreachable(e.to_string())
    }
}
