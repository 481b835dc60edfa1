//! HTTP 服务
//!
//! 对外暴露语音助理的五个面：
//! - `POST /api/chat`：提交一条消息，同步拿到答复文本
//! - `POST /api/agent/reply`：外部代理的异步回调入口
//! - `GET /api/history/{user_id}` / `POST /api/clear/{user_id}`：会话历史
//! - `GET /api/tasks`：任务列表（只读，调试与仪表盘用）
//! - `GET /api/health`：健康检查

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router as AxumRouter,
};
use serde::{Deserialize, Serialize};

use crate::router::{AgentBridge, ChatMessage, Reply, Router, SessionRegistry};
use crate::store::{Task, TaskStore};

/// 服务共享状态
pub struct AppState {
    pub router: Arc<Router>,
    pub bridge: Arc<AgentBridge>,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn TaskStore>,
}

/// 创建 API 路由
pub fn create_router(state: Arc<AppState>) -> AxumRouter {
    AxumRouter::new()
        .route("/api/chat", post(chat))
        .route("/api/agent/reply", post(agent_reply))
        .route("/api/history/:user_id", get(history))
        .route("/api/clear/:user_id", post(clear))
        .route("/api/tasks", get(tasks))
        .route("/api/health", get(health))
        .with_state(state)
}

/// POST /api/chat 请求体
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// 缺省为单用户场景的固定 id
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "default".to_string()
}

/// POST /api/chat - 提交消息并同步等待答复
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Json<Reply> {
    Json(state.router.submit(&req.user_id, &req.message).await)
}

/// POST /api/agent/reply 请求体
#[derive(Debug, Deserialize)]
pub struct AgentReplyRequest {
    pub correlation_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AgentReplyResponse {
    /// false 表示该关联 id 已超期或未知，回复被丢弃
    pub accepted: bool,
}

/// POST /api/agent/reply - 代理异步投递答复
async fn agent_reply(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentReplyRequest>,
) -> Json<AgentReplyResponse> {
    let accepted = state.bridge.resolve(&req.correlation_id, req.text).await;
    Json(AgentReplyResponse { accepted })
}

/// GET /api/history/{user_id} - 会话历史（最近的在后）
async fn history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Vec<ChatMessage>> {
    Json(state.registry.history(&user_id).await)
}

/// POST /api/clear/{user_id} - 清空会话（幂等）
async fn clear(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> StatusCode {
    state.registry.clear(&user_id).await;
    StatusCode::NO_CONTENT
}

/// GET /api/tasks - 任务列表
async fn tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Task>>, StatusCode> {
    match state.store.list_tasks().await {
        Ok(tasks) => Ok(Json(tasks)),
        Err(e) => {
            tracing::error!("task list failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub pending_delegations: usize,
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.active_count().await,
        pending_delegations: state.bridge.pending_count().await,
    })
}
