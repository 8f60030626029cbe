use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话 id
pub type ThreadId = String;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// 回复引用的来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            sources: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
            sources,
            created_at: Utc::now(),
        }
    }
}

/// 对话会话，只在本次会话内存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: ThreadId,
    pub name: String,
    /// 按追加顺序排列
    pub history: Vec<Message>,
}

impl ChatThread {
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            history: Vec::new(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }
}
