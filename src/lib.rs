//! Valet - Rust 语音助理命令路由
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 存储与桥接错误类型
//! - **observability**: tracing 日志初始化
//! - **router**: 路由核心（会话、分类、本地动作、代理桥接）
//! - **server**: HTTP API（聊天、代理回调、历史、健康检查）
//! - **store**: 任务 / 项目 / 工作日志存储（内存与 JSON 文件两种实现）

pub mod config;
pub mod error;
pub mod observability;
pub mod router;
pub mod server;
pub mod store;
