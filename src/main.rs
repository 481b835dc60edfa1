//! Valet - Rust 语音助理命令路由
//!
//! 入口：初始化日志、装配存储 / 会话 / 路由器 / 代理桥接，启动 HTTP 服务。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use valet::config::load_config;
use valet::router::{
    AgentBridge, AgentTransport, Classifier, HttpAgentTransport, LocalExecutor, NullTransport,
    Router, SessionRegistry,
};
use valet::server::{create_router, AppState};
use valet::store::{JsonStore, MemoryStore, TaskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    valet::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    // 存储：配置了数据文件则与仪表盘共用 JSON 快照，否则纯内存
    let store: Arc<dyn TaskStore> = match cfg.store.data_path {
        Some(ref path) => {
            tracing::info!("using json store at {}", path.display());
            Arc::new(JsonStore::open(path).context("Failed to open data file")?)
        }
        None => {
            tracing::info!("no data file configured, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // 代理传输：未配置端点时一律走不可达回退
    let transport: Arc<dyn AgentTransport> = match cfg.agent.endpoint {
        Some(ref endpoint) => {
            tracing::info!("agent endpoint: {}", endpoint);
            Arc::new(HttpAgentTransport::new(
                endpoint.clone(),
                cfg.agent.token.clone(),
            ))
        }
        None => {
            tracing::warn!("no agent endpoint configured, delegations will fall back");
            Arc::new(NullTransport)
        }
    };

    let registry = Arc::new(SessionRegistry::new(cfg.session.max_history));
    let bridge = Arc::new(AgentBridge::new(
        transport,
        Duration::from_secs(cfg.agent.reply_deadline_secs),
        cfg.agent.callback_base.clone(),
    ));
    let router = Arc::new(Router::new(
        Arc::clone(&registry),
        Classifier::new(&cfg.agent.assistant_name),
        LocalExecutor::new(Arc::clone(&store), cfg.agent.assistant_name.clone()),
        Arc::clone(&bridge),
    ));

    let state = Arc::new(AppState {
        router,
        bridge,
        registry,
        store,
    });

    let addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("valet listening on {}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("Server exited")?;

    Ok(())
}
