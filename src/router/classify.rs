//! 命令分类
//!
//! 对消息文本做纯规则分类，产出唯一路由：本地快速动作、本地查询、
//! 委派给外部代理、或能力说明回退。规则顺序固定且有语义：
//!
//! 1. 快速动作（最具体、确定性最强）——提取出的参数为空则视为未命中，落到下一条
//! 2. 本地查询（只读，从不委派）
//! 3. 委派动词 / 称呼前缀——仅在没有本地规则消费掉消息时才检查
//! 4. 回退
//!
//! 关键词集合有重叠（如 "create task" 与 "create a landing page" 都含
//! "create"），调整顺序会改变行为，勿随意移动。
//! 匹配不区分大小写；提取出的参数保留原文大小写。

use regex::Regex;

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 创建任务，title 为去掉动词短语后的剩余文本（原文大小写）
    AddTask { title: String },
    /// 完成任务，fragment 为用于模糊匹配的任务名片段
    CompleteTask { fragment: String },
    /// 追加工作日志
    LogWork { entry: String },
    /// 本地只读查询
    Query(QueryTopic),
    /// 委派给外部代理
    Delegate,
    /// 无规则命中：返回能力说明
    Fallback,
}

/// 本地查询主题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTopic {
    Email,
    Calendar,
    Tasks,
    Projects,
    Weather,
    Time,
    Greeting,
    Health,
}

/// 规则分类器（正则在构造时编译一次）
pub struct Classifier {
    add_task: Regex,
    add_task_strip: Regex,
    complete_task: Regex,
    complete_strip: Regex,
    complete_noise: Regex,
    log_work: Regex,
    log_work_strip: Regex,
    task_query: Regex,
    task_action_verb: Regex,
    time_word: Regex,
    delegate_verb: Regex,
    address_prefix: Regex,
}

impl Classifier {
    /// assistant_name 作为称呼前缀之一（如 "hey valet"、"valet, ..."）
    pub fn new(assistant_name: &str) -> Self {
        // 名字为空时不能留下空的分支，否则前缀正则会匹配一切
        let name = assistant_name.trim().to_lowercase();
        let address_prefix = if name.is_empty() {
            r"(?i)^\s*(?:hey|please|can you)\b".to_string()
        } else {
            format!(
                r"(?i)^\s*(?:hey|{}|please|can you)\b",
                regex::escape(&name)
            )
        };
        Self {
            add_task: Regex::new(r"(?i)\b(?:add|create|new)\s+task\b").unwrap(),
            add_task_strip: Regex::new(r"(?i)^.*(?:add|create|new)\s+task[:\s]*").unwrap(),
            complete_task: Regex::new(
                r"(?i)\b(?:mark|complete|finish)\b.*\b(?:task|as done)\b",
            )
            .unwrap(),
            complete_strip: Regex::new(r"(?i)^.*?\b(?:mark|complete|finish)\b[:\s]*").unwrap(),
            complete_noise: Regex::new(r"(?i)\btask\b|\bas done\b|\bcompleted\b").unwrap(),
            log_work: Regex::new(r"(?i)\b(?:log work|add to work log)\b").unwrap(),
            log_work_strip: Regex::new(r"(?i)^.*(?:log work|add to work log)[:\s]*").unwrap(),
            task_query: Regex::new(r"(?i)^(?:what|show|list|get)\b.*\b(?:tasks?|todos?)\b")
                .unwrap(),
            task_action_verb: Regex::new(r"(?i)\b(?:add|create|new|mark|complete|finish)\b")
                .unwrap(),
            time_word: Regex::new(r"(?i)\btime\b").unwrap(),
            delegate_verb: Regex::new(
                r"(?i)\b(?:build|restart|deploy|create|fix|update|install|configure|search|research|write|code|script|server|system|file|directory|git|push|commit|terminal|command|run)\b",
            )
            .unwrap(),
            address_prefix: Regex::new(&address_prefix).unwrap(),
        }
    }

    /// 对消息做一次完整分类
    pub fn classify(&self, text: &str) -> Command {
        let lower = text.to_lowercase();

        // 1. 快速动作：参数为空则落空，不消费消息
        if self.add_task.is_match(&lower) {
            let title = self.add_task_strip.replace(text, "").trim().to_string();
            if !title.is_empty() {
                return Command::AddTask { title };
            }
        }

        if self.complete_task.is_match(&lower) {
            let stripped = self.complete_strip.replace(text, "");
            let fragment = self.complete_noise.replace_all(&stripped, "").trim().to_string();
            if !fragment.is_empty() {
                return Command::CompleteTask { fragment };
            }
        }

        if self.log_work.is_match(&lower) {
            let entry = self.log_work_strip.replace(text, "").trim().to_string();
            if !entry.is_empty() {
                return Command::LogWork { entry };
            }
        }

        // 2. 本地查询
        if let Some(topic) = self.query_topic(&lower) {
            return Command::Query(topic);
        }

        // 3. 委派：动作动词或称呼前缀
        if self.delegate_verb.is_match(&lower) || self.address_prefix.is_match(&lower) {
            return Command::Delegate;
        }

        Command::Fallback
    }

    fn query_topic(&self, lower: &str) -> Option<QueryTopic> {
        if lower.contains("email") || lower.contains("inbox") || lower.contains("unread") {
            return Some(QueryTopic::Email);
        }
        if lower.contains("calendar")
            || lower.contains("schedule")
            || lower.contains("meeting")
            || lower.contains("appointment")
        {
            return Some(QueryTopic::Calendar);
        }
        // 任务列表：疑问/展示开头，或提到 task 但不带任何动作动词
        if self.task_query.is_match(lower)
            || (lower.contains("task") && !self.task_action_verb.is_match(lower))
        {
            return Some(QueryTopic::Tasks);
        }
        if lower.contains("project") {
            return Some(QueryTopic::Projects);
        }
        if lower.contains("weather") || lower.contains("temperature") {
            return Some(QueryTopic::Weather);
        }
        // 整词匹配：downtime / sometimes 不算问时间
        if self.time_word.is_match(lower) || lower.contains("clock") {
            return Some(QueryTopic::Time);
        }
        if lower.contains("hello") || lower.contains("hi ") || lower.trim() == "hi" {
            return Some(QueryTopic::Greeting);
        }
        if lower.contains("how are you") || lower.contains("status") || lower.contains("health") {
            return Some(QueryTopic::Health);
        }
        None
    }
}
