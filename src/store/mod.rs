//! 任务存储协作方
//!
//! 路由核心把任务/项目/工作日志当作一个窄接口的键值集合：
//! - `TaskStore` trait：创建 / 查找 / 更新 / 追加日志，外加只读的邮件与日历快照
//! - `MemoryStore`：纯内存实现（测试与未配置数据文件时的默认）
//! - `JsonStore`：JSON 文件快照实现（与仪表盘共用同一份数据文件）
//!
//! 查询处理器只读，任务变更仅来自两个动作处理器；存储失败以 `StoreError`
//! 返回，由执行器转换为致歉文本，不会让路由器崩溃。

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

/// 任务（字段对齐仪表盘数据文件）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// 新建任务的输入
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub assignee: String,
}

impl Task {
    fn from_new(new: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            priority: new.priority,
            assignee: new.assignee,
            created: now,
            updated: now,
        }
    }
}

/// 任务字段更新（None 表示不变）
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// 项目（外部维护，这里只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub current: Option<String>,
}

/// 工作日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLogEntry {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkLogEntry {
    pub fn new(text: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: format!("log_{}", uuid::Uuid::new_v4()),
            text: text.into(),
            kind: kind.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 缓存的邮箱状态（由外部数据提供方写入快照，这里只读）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailStatus {
    #[serde(default)]
    pub unread: usize,
    #[serde(default)]
    pub alerts: Vec<String>,
}

/// 日历事件（同上，只读缓存）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
}

/// 数据快照：与仪表盘 JSON 文件同构（camelCase 键）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default, rename = "workLog")]
    pub work_log: Vec<WorkLogEntry>,
    #[serde(default, rename = "emailStatus")]
    pub email_status: EmailStatus,
    #[serde(default)]
    pub calendar: Vec<CalendarEvent>,
}

impl Snapshot {
    /// 新任务与日志都插到队首，保持「最近的在前」
    fn create_task(&mut self, new: NewTask) -> Task {
        let task = Task::from_new(new);
        self.tasks.insert(0, task.clone());
        task
    }

    fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        task.updated = Utc::now();
        Ok(task.clone())
    }

    fn append_log(&mut self, entry: WorkLogEntry) {
        self.work_log.insert(0, entry);
    }
}

/// 任务存储接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 创建任务（默认 pending / 由调用方给定优先级与负责人）
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError>;

    /// 按谓词查找第一个匹配的任务（存储序）
    async fn find_task(
        &self,
        pred: &(dyn for<'a> Fn(&'a Task) -> bool + Send + Sync),
    ) -> Result<Option<Task>, StoreError>;

    /// 更新任务字段
    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError>;

    /// 追加工作日志
    async fn append_log(&self, entry: WorkLogEntry) -> Result<(), StoreError>;

    /// 全部任务（存储序，最近的在前）
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// 全部项目
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    /// 缓存的邮箱状态
    async fn email_status(&self) -> Result<EmailStatus, StoreError>;

    /// 缓存的日历事件
    async fn upcoming_events(&self) -> Result<Vec<CalendarEvent>, StoreError>;
}
