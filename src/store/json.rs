//! JSON 文件任务存储
//!
//! 与仪表盘共用同一份数据文件：启动时整体载入，每次变更后整体写回
//! （pretty JSON，便于人工查看）。查询走内存快照，不触盘。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    CalendarEvent, EmailStatus, NewTask, Project, Snapshot, Task, TaskPatch, TaskStore,
    WorkLogEntry,
};
use crate::error::StoreError;

/// 文件快照存储
pub struct JsonStore {
    path: PathBuf,
    inner: RwLock<Snapshot>,
}

impl JsonStore {
    /// 打开（或初始化）数据文件；文件不存在时从空快照开始
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: RwLock::new(snapshot),
        })
    }

    /// 持锁写盘：变更与落盘对并发写互斥
    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonStore {
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let task = inner.create_task(new);
        self.persist(&inner)?;
        Ok(task)
    }

    async fn find_task(
        &self,
        pred: &(dyn for<'a> Fn(&'a Task) -> bool + Send + Sync),
    ) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tasks.iter().find(|t| pred(t)).cloned())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let task = inner.update_task(id, patch)?;
        self.persist(&inner)?;
        Ok(task)
    }

    async fn append_log(&self, entry: WorkLogEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.append_log(entry);
        self.persist(&inner)?;
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.inner.read().await.tasks.clone())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.inner.read().await.projects.clone())
    }

    async fn email_status(&self) -> Result<EmailStatus, StoreError> {
        Ok(self.inner.read().await.email_status.clone())
    }

    async fn upcoming_events(&self) -> Result<Vec<CalendarEvent>, StoreError> {
        Ok(self.inner.read().await.calendar.clone())
    }
}
