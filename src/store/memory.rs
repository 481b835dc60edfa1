//! 内存任务存储：测试与未配置数据文件时的默认实现

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    CalendarEvent, EmailStatus, NewTask, Project, Snapshot, Task, TaskPatch, TaskStore,
    WorkLogEntry,
};
use crate::error::StoreError;

/// 纯内存存储
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试与演示用：预置邮箱状态
    pub async fn set_email_status(&self, status: EmailStatus) {
        self.inner.write().await.email_status = status;
    }

    /// 测试与演示用：预置项目列表
    pub async fn set_projects(&self, projects: Vec<Project>) {
        self.inner.write().await.projects = projects;
    }

    /// 测试与演示用：预置日历事件
    pub async fn set_calendar(&self, events: Vec<CalendarEvent>) {
        self.inner.write().await.calendar = events;
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        Ok(self.inner.write().await.create_task(new))
    }

    async fn find_task(
        &self,
        pred: &(dyn for<'a> Fn(&'a Task) -> bool + Send + Sync),
    ) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tasks.iter().find(|t| pred(t)).cloned())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        self.inner.write().await.update_task(id, patch)
    }

    async fn append_log(&self, entry: WorkLogEntry) -> Result<(), StoreError> {
        self.inner.write().await.append_log(entry);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{TaskPriority, TaskStatus};

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: String::new(),
            priority: TaskPriority::Medium,
            assignee: "Valet".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryStore::new();
        let task = store.create_task(new_task("Buy milk")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);

        let found = store
            .find_task(&|t: &Task| t.title == "Buy milk")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, task.id);
    }

    #[tokio::test]
    async fn test_newest_task_first() {
        let store = MemoryStore::new();
        store.create_task(new_task("first")).await.unwrap();
        store.create_task(new_task("second")).await.unwrap();

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks[0].title, "second");
        assert_eq!(tasks[1].title, "first");
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let store = MemoryStore::new();
        let err = store
            .update_task("task_missing", TaskPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(_)));
    }
}
