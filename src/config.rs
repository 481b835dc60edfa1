//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `VALET__*` 覆盖（双下划线表示嵌套，
//! 如 `VALET__AGENT__ENDPOINT=http://127.0.0.1:18789/v1/sessions/send`）。

use serde::Deserialize;
use std::path::PathBuf;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// [agent] 段：外部代理端点与回复期限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 代理进程的指令接收端点；未设置时桥接立即走不可达回退
    pub endpoint: Option<String>,
    /// Bearer token，可选
    pub token: Option<String>,
    /// 回复期限（秒）：调用方可见延迟的硬上限
    #[serde(default = "default_reply_deadline_secs")]
    pub reply_deadline_secs: u64,
    /// 回调基地址：代理异步投递回复的目标（拼接 /api/agent/reply）
    pub callback_base: Option<String>,
    /// 助手显示名：任务 assignee、唤醒词与问候语中使用
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
}

fn default_reply_deadline_secs() -> u64 {
    90
}

fn default_assistant_name() -> String {
    "Valet".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            reply_deadline_secs: default_reply_deadline_secs(),
            callback_base: None,
            assistant_name: default_assistant_name(),
        }
    }
}

/// [session] 段：会话历史保留条数
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 每个用户保留的最近消息条数（再旧的先丢弃）
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    10
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

/// [store] 段：任务数据文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreSection {
    /// JSON 快照路径（如 data/dashboard-data.json）；未设置时使用内存存储
    pub data_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            agent: AgentSection::default(),
            session: SessionSection::default(),
            store: StoreSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 VALET__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 VALET__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VALET")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
