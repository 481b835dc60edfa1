//! 会话管理
//!
//! 每个用户一个内存会话：有序消息历史（截断到最近 N 条）+ 忙碌标志。
//! 忙碌标志通过 `try_begin_turn` 以 RAII 守卫获取，守卫 Drop 时必然释放，
//! 处理器崩溃也不会把用户永久锁死。会话随进程生存，不做持久化。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 一条会话消息
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// 单个会话
struct Session {
    history: Vec<ChatMessage>,
    /// 忙碌标志与 TurnGuard 共享，守卫 Drop 时置回 false
    busy: Arc<AtomicBool>,
    last_active: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            busy: Arc::new(AtomicBool::new(false)),
            last_active: Utc::now(),
        }
    }
}

/// 轮次守卫：持有期间该用户的会话处于忙碌态
pub struct TurnGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// 会话注册表（user_id -> Session）
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    /// 每用户保留的最近消息条数
    max_history: usize,
}

impl SessionRegistry {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// 获取或创建用户会话（只保证存在，不返回引用）
    pub async fn get_or_create(&self, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(user_id.to_string()).or_insert_with(Session::new);
    }

    /// 尝试开始一个轮次：会话空闲则标记忙碌并返回守卫，否则 None
    ///
    /// 用 compare_exchange 保证同一用户并发调用只有一个能拿到守卫。
    pub async fn try_begin_turn(&self, user_id: &str) -> Option<TurnGuard> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);
        session.last_active = Utc::now();
        let busy = Arc::clone(&session.busy);
        drop(sessions);

        if busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(TurnGuard { busy })
        } else {
            None
        }
    }

    /// 会话是否有进行中的轮次
    pub async fn is_busy(&self, user_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|s| s.busy.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// 追加消息并截断到最近 max_history 条（先丢最旧的，顺序不变）
    pub async fn append_message(&self, user_id: &str, role: Role, text: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);
        session.history.push(ChatMessage {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
        if session.history.len() > self.max_history {
            let excess = session.history.len() - self.max_history;
            session.history.drain(..excess);
        }
        session.last_active = Utc::now();
    }

    /// 用户的消息历史（复制返回）
    pub async fn history(&self, user_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// 清空用户会话；用户不存在时静默成功
    pub async fn clear(&self, user_id: &str) {
        self.sessions.write().await.remove(user_id);
    }

    /// 活跃会话数
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_truncation_keeps_newest() {
        let registry = SessionRegistry::new(3);
        for i in 0..5 {
            registry
                .append_message("kris", Role::User, format!("msg {}", i))
                .await;
        }
        let history = registry.history("kris").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, "msg 2");
        assert_eq!(history[2].text, "msg 4");
    }

    #[tokio::test]
    async fn test_turn_guard_releases_on_drop() {
        let registry = SessionRegistry::new(10);
        let guard = registry.try_begin_turn("kris").await;
        assert!(guard.is_some());
        assert!(registry.is_busy("kris").await);
        assert!(registry.try_begin_turn("kris").await.is_none());

        drop(guard);
        assert!(!registry.is_busy("kris").await);
        assert!(registry.try_begin_turn("kris").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let registry = SessionRegistry::new(10);
        registry.clear("nobody").await;
        registry.append_message("kris", Role::User, "hi").await;
        registry.clear("kris").await;
        assert!(registry.history("kris").await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = SessionRegistry::new(10);
        let _guard = registry.try_begin_turn("a").await.unwrap();
        assert!(registry.try_begin_turn("b").await.is_some());
    }
}
