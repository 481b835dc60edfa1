//! 路由器
//!
//! 每条消息一个轮次：抢占会话忙碌标志（抢不到直接拒绝，不入历史），
//! 记录用户消息，按分类结果分发到本地执行器或代理桥接，最后记录助手
//! 答复。对外契约是「总会在期限内返回文本」，任何内部失败都已在各自
//! 边界转换为对话文本。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::actions::LocalExecutor;
use super::bridge::AgentBridge;
use super::classify::{Classifier, Command};
use super::session::{Role, SessionRegistry};

/// 会话忙碌时的拒绝答复（不入历史）
const BUSY_REPLY: &str =
    "I'm still working on your last request. Give me a moment and try again.";

/// 空消息的提示（不入历史）
const EMPTY_REPLY: &str = "I didn't catch that. Could you say it again?";

/// 答复来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    /// 本地处理（快速动作、查询、能力说明）
    Local,
    /// 经代理桥接（含超时临时答复与不可达回退）
    Agent,
    /// 会话忙碌，本条被拒绝
    Busy,
}

/// 一次轮次的结果
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source: ReplySource,
}

impl Reply {
    fn now(text: String, source: ReplySource) -> Self {
        Self {
            text,
            timestamp: Utc::now(),
            source,
        }
    }
}

/// 命令路由器
pub struct Router {
    registry: Arc<SessionRegistry>,
    classifier: Classifier,
    executor: LocalExecutor,
    bridge: Arc<AgentBridge>,
}

impl Router {
    pub fn new(
        registry: Arc<SessionRegistry>,
        classifier: Classifier,
        executor: LocalExecutor,
        bridge: Arc<AgentBridge>,
    ) -> Self {
        Self {
            registry,
            classifier,
            executor,
            bridge,
        }
    }

    /// 处理一条用户消息
    ///
    /// 忙碌拒绝与空消息提示不写入历史；正常轮次先记用户消息再分发，
    /// 答复产生后记助手消息。守卫跨 await 持有，分发路径提前返回或
    /// panic 都会释放忙碌标志。
    pub async fn submit(&self, user_id: &str, text: &str) -> Reply {
        let text = text.trim();
        if text.is_empty() {
            return Reply::now(EMPTY_REPLY.to_string(), ReplySource::Local);
        }

        let Some(_guard) = self.registry.try_begin_turn(user_id).await else {
            tracing::debug!(user_id = %user_id, "turn rejected, session busy");
            return Reply::now(BUSY_REPLY.to_string(), ReplySource::Busy);
        };

        self.registry
            .append_message(user_id, Role::User, text)
            .await;

        let command = self.classifier.classify(text);
        tracing::info!(user_id = %user_id, command = ?command_label(&command), "routing message");

        let (reply_text, source) = match command {
            Command::AddTask { title } => {
                (self.executor.add_task(&title).await, ReplySource::Local)
            }
            Command::CompleteTask { fragment } => (
                self.executor.complete_task(&fragment).await,
                ReplySource::Local,
            ),
            Command::LogWork { entry } => {
                (self.executor.log_work(&entry).await, ReplySource::Local)
            }
            Command::Query(topic) => (self.executor.query(topic, text).await, ReplySource::Local),
            Command::Delegate => (
                self.bridge.delegate(user_id, text).await,
                ReplySource::Agent,
            ),
            Command::Fallback => (self.executor.capabilities(text), ReplySource::Local),
        };

        self.registry
            .append_message(user_id, Role::Assistant, reply_text.clone())
            .await;

        Reply::now(reply_text, source)
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::AddTask { .. } => "add_task",
        Command::CompleteTask { .. } => "complete_task",
        Command::LogWork { .. } => "log_work",
        Command::Query(_) => "query",
        Command::Delegate => "delegate",
        Command::Fallback => "fallback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, StoreError};
    use crate::router::bridge::AgentTransport;
    use crate::store::{
        CalendarEvent, EmailStatus, MemoryStore, NewTask, Project, Task, TaskPatch, TaskStatus,
        TaskStore, WorkLogEntry,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// 答复前挂起一段时间，用来制造进行中的轮次
    struct SlowTransport {
        delay: Duration,
    }

    #[async_trait]
    impl AgentTransport for SlowTransport {
        async fn send(&self, _: &str, _: &str) -> Result<Option<String>, BridgeError> {
            tokio::time::sleep(self.delay).await;
            Ok(Some("agent done".to_string()))
        }
    }

    /// 所有操作都失败的存储
    struct FailingStore;

    fn offline() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk offline"))
    }

    #[async_trait]
    impl TaskStore for FailingStore {
        async fn create_task(&self, _: NewTask) -> Result<Task, StoreError> {
            Err(offline())
        }
        async fn find_task(
            &self,
            _: &(dyn for<'a> Fn(&'a Task) -> bool + Send + Sync),
        ) -> Result<Option<Task>, StoreError> {
            Err(offline())
        }
        async fn update_task(&self, _: &str, _: TaskPatch) -> Result<Task, StoreError> {
            Err(offline())
        }
        async fn append_log(&self, _: WorkLogEntry) -> Result<(), StoreError> {
            Err(offline())
        }
        async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
            Err(offline())
        }
        async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
            Err(offline())
        }
        async fn email_status(&self) -> Result<EmailStatus, StoreError> {
            Err(offline())
        }
        async fn upcoming_events(&self) -> Result<Vec<CalendarEvent>, StoreError> {
            Err(offline())
        }
    }

    fn router_with(store: Arc<MemoryStore>, delay_ms: u64) -> Arc<Router> {
        let registry = Arc::new(SessionRegistry::new(10));
        let bridge = Arc::new(AgentBridge::new(
            Arc::new(SlowTransport {
                delay: Duration::from_millis(delay_ms),
            }),
            Duration::from_secs(5),
            None,
        ));
        Arc::new(Router::new(
            registry,
            Classifier::new("Valet"),
            LocalExecutor::new(store, "Valet"),
            bridge,
        ))
    }

    fn router(store: Arc<MemoryStore>) -> Arc<Router> {
        router_with(store, 0)
    }

    #[tokio::test]
    async fn test_add_then_complete_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let r = router(Arc::clone(&store));

        let reply = r.submit("kris", "add task: Buy milk").await;
        assert_eq!(reply.source, ReplySource::Local);
        assert!(reply.text.contains("\"Buy milk\""));

        let reply = r.submit("kris", "mark task buy milk as done").await;
        assert!(reply.text.contains("completed"));

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_turn_records_user_then_assistant() {
        let store = Arc::new(MemoryStore::new());
        let r = router(store);

        r.submit("kris", "hello").await;
        let history = r.registry.history("kris").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "hello");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_without_history() {
        let store = Arc::new(MemoryStore::new());
        let r = router_with(store, 300);

        let first = {
            let r = Arc::clone(&r);
            tokio::spawn(async move { r.submit("kris", "deploy the site").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rejected = r.submit("kris", "what time is it").await;
        assert_eq!(rejected.source, ReplySource::Busy);

        let first = first.await.unwrap();
        assert_eq!(first.source, ReplySource::Agent);
        assert_eq!(first.text, "agent done");

        // 被拒绝的消息与其答复都不入历史
        let history = r.registry.history("kris").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "deploy the site");
    }

    #[tokio::test]
    async fn test_distinct_users_run_concurrently() {
        let store = Arc::new(MemoryStore::new());
        let r = router_with(store, 200);

        let a = {
            let r = Arc::clone(&r);
            tokio::spawn(async move { r.submit("a", "deploy the site").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 另一个用户不受 a 的进行中轮次影响
        let b = r.submit("b", "hello").await;
        assert_eq!(b.source, ReplySource::Local);

        assert_eq!(a.await.unwrap().text, "agent done");
    }

    #[tokio::test]
    async fn test_empty_message_is_not_recorded() {
        let store = Arc::new(MemoryStore::new());
        let r = router(store);

        let reply = r.submit("kris", "   ").await;
        assert!(reply.text.contains("didn't catch"));
        assert!(r.registry.history("kris").await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_still_answers_and_releases_turn() {
        let registry = Arc::new(SessionRegistry::new(10));
        let bridge = Arc::new(AgentBridge::new(
            Arc::new(SlowTransport {
                delay: Duration::from_millis(0),
            }),
            Duration::from_secs(5),
            None,
        ));
        let r = Router::new(
            Arc::clone(&registry),
            Classifier::new("Valet"),
            LocalExecutor::new(Arc::new(FailingStore), "Valet"),
            bridge,
        );

        let reply = r.submit("kris", "add task: Buy milk").await;
        assert_eq!(reply.source, ReplySource::Local);
        assert!(reply.text.contains("couldn't reach the task list"));

        // 轮次正常收尾：一问一答入历史，忙碌标志已释放
        assert_eq!(registry.history("kris").await.len(), 2);
        assert!(!registry.is_busy("kris").await);
        let again = r.submit("kris", "what emails do I have?").await;
        assert_eq!(again.source, ReplySource::Local);
    }

    #[tokio::test]
    async fn test_fallback_echoes_original() {
        let store = Arc::new(MemoryStore::new());
        let r = router(store);

        let reply = r.submit("kris", "banana").await;
        assert!(reply.text.contains("\"banana\""));
        assert!(reply.text.contains("Here's what I can do"));
    }
}
