//! 命令路由核心
//!
//! 语音助理的大脑：会话管理（`session`）、规则分类（`classify`）、
//! 本地动作执行（`actions`）、外部代理桥接（`bridge`），由 `runtime`
//! 里的 [`Router`] 串成一条「消息进、文本出」的处理链。

pub mod actions;
pub mod bridge;
pub mod classify;
pub mod runtime;
pub mod session;

pub use actions::LocalExecutor;
pub use bridge::{AgentBridge, AgentTransport, HttpAgentTransport, NullTransport};
pub use classify::{Classifier, Command, QueryTopic};
pub use runtime::{Reply, ReplySource, Router};
pub use session::{ChatMessage, Role, SessionRegistry, TurnGuard};
