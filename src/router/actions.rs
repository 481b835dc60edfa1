//! 本地动作执行器
//!
//! 处理快速动作与本地查询两类路由，除访问任务存储外不挂起。
//! 存储变更仅限两个任务动作（创建 / 完成）与工作日志；查询处理器一律只读，
//! 输出确定性的、可朗读的摘要（计数 + 最多 3 个代表项），不倒原始数据。
//! 存储失败在此边界消化为致歉文本并记日志，绝不向路由器抛错。

use std::sync::Arc;

use chrono::{Local, Timelike};

use super::classify::QueryTopic;
use crate::error::StoreError;
use crate::store::{NewTask, Task, TaskPatch, TaskPriority, TaskStatus, TaskStore, WorkLogEntry};

/// 存储故障时的统一致歉语
const STORE_APOLOGY: &str =
    "Sorry, I couldn't reach the task list just now. Please try again in a moment.";

/// 本地执行器
pub struct LocalExecutor {
    store: Arc<dyn TaskStore>,
    /// 助手显示名：新任务的 assignee、问候语中使用
    assistant_name: String,
}

impl LocalExecutor {
    pub fn new(store: Arc<dyn TaskStore>, assistant_name: impl Into<String>) -> Self {
        Self {
            store,
            assistant_name: assistant_name.into(),
        }
    }

    /// 创建任务：默认 pending / medium，负责人固定为助手；确认语逐字引用标题
    pub async fn add_task(&self, title: &str) -> String {
        let result = self
            .store
            .create_task(NewTask {
                title: title.to_string(),
                description: "Created via voice".to_string(),
                priority: TaskPriority::Medium,
                assignee: self.assistant_name.clone(),
            })
            .await;

        let task = match result {
            Ok(t) => t,
            Err(e) => return self.apologize("create task", e),
        };

        if let Err(e) = self
            .store
            .append_log(WorkLogEntry::new(
                format!("New task created: {}", task.title),
                "task",
            ))
            .await
        {
            tracing::warn!("work log append failed after task create: {}", e);
        }

        format!(
            "Task created: \"{}\". It's in your pending tasks now. Want me to mark it as in-progress?",
            task.title
        )
    }

    /// 完成任务：双向不区分大小写子串匹配，多个命中取存储序第一个；
    /// 无命中时列出最多 3 个最近任务标题作为提示，而非静默失败
    pub async fn complete_task(&self, fragment: &str) -> String {
        let needle = fragment.to_lowercase();
        let found = self
            .store
            .find_task(&move |t: &Task| {
                let title = t.title.to_lowercase();
                title.contains(&needle) || needle.contains(&title)
            })
            .await;

        let found = match found {
            Ok(f) => f,
            Err(e) => return self.apologize("complete task", e),
        };

        let Some(task) = found else {
            let tasks = match self.store.list_tasks().await {
                Ok(t) => t,
                Err(e) => return self.apologize("complete task", e),
            };
            if tasks.is_empty() {
                return "No tasks found.".to_string();
            }
            let recent: Vec<String> = tasks
                .iter()
                .take(3)
                .map(|t| format!("\"{}\"", t.title))
                .collect();
            return format!(
                "I couldn't find a task matching \"{}\". Your recent tasks are: {}",
                fragment,
                recent.join(", ")
            );
        };

        if let Err(e) = self
            .store
            .update_task(
                &task.id,
                TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await
        {
            return self.apologize("complete task", e);
        }

        if let Err(e) = self
            .store
            .append_log(WorkLogEntry::new(
                format!("Task completed: {}", task.title),
                "task",
            ))
            .await
        {
            tracing::warn!("work log append failed after task complete: {}", e);
        }

        format!("Marked \"{}\" as completed. Great work!", task.title)
    }

    /// 追加工作日志
    pub async fn log_work(&self, entry: &str) -> String {
        match self
            .store
            .append_log(WorkLogEntry::new(entry.to_string(), "voice"))
            .await
        {
            Ok(()) => format!("Logged: \"{}\" to your work log.", entry),
            Err(e) => self.apologize("log work", e),
        }
    }

    /// 本地查询分发（只读）；original 用于识别点名查询的项目
    pub async fn query(&self, topic: QueryTopic, original: &str) -> String {
        match topic {
            QueryTopic::Email => self.email_summary().await,
            QueryTopic::Calendar => self.calendar_summary().await,
            QueryTopic::Tasks => self.task_summary().await,
            QueryTopic::Projects => self.project_summary(original).await,
            QueryTopic::Weather => {
                "I can't check live weather right now. I can help with emails, tasks, and projects though!"
                    .to_string()
            }
            QueryTopic::Time => self.time_now(),
            QueryTopic::Greeting => self.greeting(),
            QueryTopic::Health => {
                "All systems operational. I'm connected to your inbox, calendar, and task board. \
                 I can read email summaries, check your schedule, manage tasks, and hand bigger \
                 jobs to the agent. What would you like me to do?"
                    .to_string()
            }
        }
    }

    /// 无规则命中时的能力说明
    pub fn capabilities(&self, original: &str) -> String {
        format!(
            "I heard you say: \"{original}\"\n\n\
             Here's what I can do:\n\
             - Add tasks: \"Add task: Call John tomorrow\"\n\
             - Complete tasks: \"Mark task Call John as done\"\n\
             - Check emails: \"What emails do I have?\"\n\
             - View calendar: \"What's my schedule?\"\n\
             - See projects: \"Show my projects\"\n\
             - Delegate work: \"Hey {name}, research flight options\"\n\n\
             What would you like me to do?",
            original = original,
            name = self.assistant_name,
        )
    }

    async fn email_summary(&self) -> String {
        let status = match self.store.email_status().await {
            Ok(s) => s,
            Err(e) => return self.apologize("check email", e),
        };
        if status.unread == 0 {
            return "Good news! You have no unread emails. Your inbox is clear.".to_string();
        }
        let mut reply = format!(
            "You currently have {} unread email{}.",
            status.unread,
            if status.unread > 1 { "s" } else { "" }
        );
        if !status.alerts.is_empty() {
            let items: Vec<&str> = status.alerts.iter().take(3).map(String::as_str).collect();
            reply.push_str(&format!(" Key items: {}.", items.join(", ")));
        }
        reply
    }

    async fn calendar_summary(&self) -> String {
        let events = match self.store.upcoming_events().await {
            Ok(e) => e,
            Err(err) => return self.apologize("check calendar", err),
        };
        if events.is_empty() {
            return "Your calendar is clear. No upcoming meetings or appointments scheduled."
                .to_string();
        }
        let upcoming: Vec<String> = events
            .iter()
            .take(3)
            .map(|e| {
                format!(
                    "\"{}\" at {}",
                    e.summary,
                    e.start.with_timezone(&Local).format("%I:%M %p")
                )
            })
            .collect();
        let mut reply = format!(
            "You have {} event{} coming up. {}.",
            events.len(),
            if events.len() > 1 { "s" } else { "" },
            upcoming.join(". ")
        );
        if events.len() > 3 {
            reply.push_str(&format!(" Plus {} more.", events.len() - 3));
        }
        reply
    }

    async fn task_summary(&self) -> String {
        let tasks = match self.store.list_tasks().await {
            Ok(t) => t,
            Err(e) => return self.apologize("list tasks", e),
        };
        let active: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .collect();
        let pending = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();

        let mut reply = format!("You have {} total tasks. ", tasks.len());
        if !active.is_empty() {
            let names: Vec<String> = active
                .iter()
                .take(2)
                .map(|t| format!("\"{}\"", t.title))
                .collect();
            reply.push_str(&format!(
                "{} in progress, including: {}. ",
                active.len(),
                names.join(" and ")
            ));
        }
        if pending > 0 {
            reply.push_str(&format!("{} pending. ", pending));
        }
        reply.push_str(&format!("{} completed recently.", completed));

        if !active.is_empty() {
            reply.push_str(" Would you like me to update the status on any of these?");
        } else if pending > 0 {
            reply.push_str(" Want me to start one of the pending tasks?");
        }
        reply
    }

    async fn project_summary(&self, original: &str) -> String {
        let projects = match self.store.list_projects().await {
            Ok(p) => p,
            Err(e) => return self.apologize("list projects", e),
        };
        if projects.is_empty() {
            return "No projects tracked yet.".to_string();
        }

        // 点名查询：消息里提到某个项目名或 id，单独汇报其进度
        let lower = original.to_lowercase();
        if let Some(p) = projects.iter().find(|p| {
            lower.contains(&p.name.to_lowercase()) || lower.contains(&p.id.to_lowercase())
        }) {
            let mut reply = format!("\"{}\" is {} at {}% progress.", p.name, p.status, p.progress);
            if let Some(ref current) = p.current {
                reply.push_str(&format!(" Currently: {}.", current));
            }
            return reply;
        }
        let active: Vec<String> = projects
            .iter()
            .filter(|p| p.status == "active" || p.status == "in-progress")
            .take(3)
            .map(|p| format!("\"{}\" ({}%)", p.name, p.progress))
            .collect();
        let completed = projects.iter().filter(|p| p.status == "completed").count();
        if active.is_empty() {
            format!(
                "You have {} projects tracked. {} completed.",
                projects.len(),
                completed
            )
        } else {
            format!(
                "You have {} projects tracked. {} active: {}. {} completed.",
                projects.len(),
                active.len(),
                active.join(", "),
                completed
            )
        }
    }

    fn time_now(&self) -> String {
        let now = Local::now();
        let time = now.format("%I:%M %p");
        let date = now.format("%A, %B %d");
        let context = match now.hour() {
            0..=11 => " Good morning! Ready to tackle the day?",
            12..=16 => " Good afternoon. How's your day going?",
            _ => " Good evening. Anything you need to wrap up today?",
        };
        format!("It's {} on {}.{}", time, date, context)
    }

    fn greeting(&self) -> String {
        let greeting = match Local::now().hour() {
            0..=11 => "Good morning",
            12..=16 => "Good afternoon",
            _ => "Good evening",
        };
        format!(
            "{}! I'm {}. I can check your emails, calendar, tasks, and projects, or hand bigger jobs to the agent. What would you like to know?",
            greeting, self.assistant_name
        )
    }

    fn apologize(&self, action: &str, e: StoreError) -> String {
        tracing::warn!("store failure during {}: {}", action, e);
        STORE_APOLOGY.to_string()
    }
}
