//! 代理桥接
//!
//! 把委派指令投递给外部代理进程，并把异步回来的答复与原始请求配对。
//! 每次委派生成唯一关联 id（进程内计数器 + uuid 后缀），挂进待答表，
//! 然后在回复期限内等待三种结局之一：
//!
//! - 代理给出答复（同步响应体或回调投递）：原文返回给调用方
//! - 期限到：摘掉待答项，返回「仍在处理」的临时答复；之后迟到的回复视为过期，
//!   仅记 debug 日志后丢弃，绝不事后注入会话
//! - 发送失败：立即返回本地回退文本，不等满期限
//!
//! 发送在独立任务里进行，期限到期只影响等待方，不会取消已发出的请求。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{oneshot, RwLock};

use crate::error::BridgeError;

/// 代理不可达时的回退答复
const UNREACHABLE_REPLY: &str = "I couldn't reach my agent right now, so that request didn't go \
     through. I can still help with emails, tasks, and projects directly.";

/// 期限内未收到回复时的临时答复
const STILL_WORKING_REPLY: &str = "I've handed that to my agent and it's still working on it. \
     Ask me again in a bit and I should have the result.";

/// 待答项的最终结局
#[derive(Debug)]
enum Outcome {
    Reply(String),
    Unreachable,
}

type PendingTable = Arc<RwLock<HashMap<String, oneshot::Sender<Outcome>>>>;

async fn settle(pending: &PendingTable, correlation_id: &str, outcome: Outcome) {
    if let Some(tx) = pending.write().await.remove(correlation_id) {
        let _ = tx.send(outcome);
    }
}

/// 外部代理传输层：发出一条指令
///
/// 返回 `Ok(Some(text))` 表示代理在同一次调用里直接给出了答复；
/// `Ok(None)` 表示代理已受理、稍后通过回调投递。
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(
        &self,
        instruction: &str,
        correlation_id: &str,
    ) -> Result<Option<String>, BridgeError>;
}

/// 未配置代理端点时的占位传输：一律不可达
pub struct NullTransport;

#[async_trait]
impl AgentTransport for NullTransport {
    async fn send(&self, _: &str, _: &str) -> Result<Option<String>, BridgeError> {
        Err(BridgeError::Unreachable(
            "no agent endpoint configured".to_string(),
        ))
    }
}

/// HTTP 传输：POST JSON 到代理端点，可选 Bearer token
pub struct HttpAgentTransport {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpAgentTransport {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn send(
        &self,
        instruction: &str,
        correlation_id: &str,
    ) -> Result<Option<String>, BridgeError> {
        let mut req = self.client.post(&self.endpoint).json(&json!({
            "message": instruction,
            "correlationId": correlation_id,
        }));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::BadStatus(status.as_u16()));
        }

        // 代理可能直接在响应体里给出答复（{"reply": "..."}），否则走回调
        let body = resp
            .text()
            .await
            .map_err(|e| BridgeError::InvalidReply(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => Ok(value
                .get("reply")
                .and_then(|r| r.as_str())
                .filter(|r| !r.trim().is_empty())
                .map(str::to_string)),
            Err(_) => Ok(None),
        }
    }
}

/// 代理桥接器
pub struct AgentBridge {
    transport: Arc<dyn AgentTransport>,
    pending: PendingTable,
    /// 关联 id 的进程内单调序号
    seq: AtomicU64,
    deadline: Duration,
    /// 代理异步投递回复的回调地址，写进指令文本
    callback_base: Option<String>,
}

impl AgentBridge {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        deadline: Duration,
        callback_base: Option<String>,
    ) -> Self {
        Self {
            transport,
            pending: Arc::new(RwLock::new(HashMap::new())),
            seq: AtomicU64::new(1),
            deadline,
            callback_base,
        }
    }

    /// 委派一条指令并等待结局，总是在 deadline 内返回文本
    pub async fn delegate(&self, user_id: &str, request: &str) -> String {
        let correlation_id = self.next_correlation_id();
        let instruction = self.compose_instruction(request, &correlation_id);

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(correlation_id.clone(), tx);

        tracing::info!(
            user_id = %user_id,
            correlation_id = %correlation_id,
            "delegating request to agent"
        );

        // 发送放在独立任务里：期限到期不取消已发出的请求
        let transport = Arc::clone(&self.transport);
        let pending = Arc::clone(&self.pending);
        let send_id = correlation_id.clone();
        tokio::spawn(async move {
            match transport.send(&instruction, &send_id).await {
                Ok(Some(reply)) => settle(&pending, &send_id, Outcome::Reply(reply)).await,
                Ok(None) => {
                    tracing::debug!(correlation_id = %send_id, "agent accepted, awaiting callback");
                }
                Err(e) => {
                    tracing::warn!(correlation_id = %send_id, "agent send failed: {}", e);
                    settle(&pending, &send_id, Outcome::Unreachable).await;
                }
            }
        });

        match tokio::time::timeout(self.deadline, rx).await {
            Ok(Ok(Outcome::Reply(text))) => {
                tracing::info!(correlation_id = %correlation_id, "agent reply delivered");
                text
            }
            Ok(Ok(Outcome::Unreachable)) | Ok(Err(_)) => UNREACHABLE_REPLY.to_string(),
            Err(_) => {
                // 期限到：摘掉待答项，之后的回复按过期处理
                self.pending.write().await.remove(&correlation_id);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    deadline_secs = self.deadline.as_secs(),
                    "agent reply deadline expired"
                );
                STILL_WORKING_REPLY.to_string()
            }
        }
    }

    /// 投递一条代理回复；返回是否有等待方接收
    ///
    /// 待答表中找不到关联 id（已超期或重复投递）时丢弃并返回 false。
    pub async fn resolve(&self, correlation_id: &str, reply: impl Into<String>) -> bool {
        match self.pending.write().await.remove(correlation_id) {
            Some(tx) => tx.send(Outcome::Reply(reply.into())).is_ok(),
            None => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    "dropping stale agent reply"
                );
                false
            }
        }
    }

    /// 待答请求数（健康检查用）
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    fn next_correlation_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("req_{}_{}", seq, &suffix[..8])
    }

    fn compose_instruction(&self, request: &str, correlation_id: &str) -> String {
        let mut instruction = format!(
            "[VOICE REQUEST] The user asked via voice: \"{}\". \
             Handle this request using your tools as needed. Correlation id: {}.",
            request, correlation_id
        );
        if let Some(ref base) = self.callback_base {
            instruction.push_str(&format!(
                " When done, POST the result as JSON {{\"correlation_id\": \"{}\", \"text\": \"...\"}} to {}/api/agent/reply.",
                correlation_id,
                base.trim_end_matches('/')
            ));
        }
        instruction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// 把收到的关联 id 发给测试方，自己不答复（等回调）
    struct CallbackTransport {
        ids: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl AgentTransport for CallbackTransport {
        async fn send(&self, _: &str, id: &str) -> Result<Option<String>, BridgeError> {
            let _ = self.ids.send(id.to_string());
            Ok(None)
        }
    }

    /// 在响应体里直接答复
    struct DirectTransport;

    #[async_trait]
    impl AgentTransport for DirectTransport {
        async fn send(&self, _: &str, _: &str) -> Result<Option<String>, BridgeError> {
            Ok(Some("done: report is on your desk".to_string()))
        }
    }

    fn bridge(transport: Arc<dyn AgentTransport>, deadline_ms: u64) -> AgentBridge {
        AgentBridge::new(
            transport,
            Duration::from_millis(deadline_ms),
            Some("http://localhost:3000".to_string()),
        )
    }

    #[tokio::test]
    async fn test_direct_reply_passes_through() {
        let b = bridge(Arc::new(DirectTransport), 1_000);
        let reply = b.delegate("kris", "research flight options").await;
        assert_eq!(reply, "done: report is on your desk");
        assert_eq!(b.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_callback_reply_resolves_waiter() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let b = Arc::new(bridge(Arc::new(CallbackTransport { ids: tx }), 1_000));

        let waiter = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.delegate("kris", "build the site").await })
        };

        let id = rx.recv().await.unwrap();
        assert!(id.starts_with("req_"));
        assert!(b.resolve(&id, "site is live").await);

        assert_eq!(waiter.await.unwrap(), "site is live");
        assert_eq!(b.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_deadline_returns_still_working() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let b = bridge(Arc::new(CallbackTransport { ids: tx }), 50);

        let start = std::time::Instant::now();
        let reply = b.delegate("kris", "slow job").await;
        assert!(reply.contains("still working"));
        assert!(start.elapsed() < Duration::from_millis(500));
        // 超期后待答项已被摘除
        assert_eq!(b.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_reply_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let b = bridge(Arc::new(CallbackTransport { ids: tx }), 50);

        b.delegate("kris", "slow job").await;
        let id = rx.recv().await.unwrap();
        assert!(!b.resolve(&id, "too late").await);
    }

    #[tokio::test]
    async fn test_unreachable_falls_back_immediately() {
        let b = bridge(Arc::new(NullTransport), 60_000);

        let start = std::time::Instant::now();
        let reply = b.delegate("kris", "anything").await;
        assert!(reply.contains("couldn't reach my agent"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_correlation_ids_are_unique() {
        let b = bridge(Arc::new(DirectTransport), 1_000);
        let a = b.next_correlation_id();
        let c = b.next_correlation_id();
        assert_ne!(a, c);
        assert!(a.starts_with("req_1_"));
        assert!(c.starts_with("req_2_"));
    }

    #[test]
    fn test_instruction_names_correlation_and_callback() {
        let b = bridge(Arc::new(DirectTransport), 1_000);
        let text = b.compose_instruction("research flights", "req_9_abcd1234");
        assert!(text.contains("[VOICE REQUEST]"));
        assert!(text.contains("research flights"));
        assert!(text.contains("req_9_abcd1234"));
        assert!(text.contains("http://localhost:3000/api/agent/reply"));
    }
}
