//! 上下文组装 - 业务能力层
//!
//! 把文档摘录、会话历史和当前消息组装成一次生成请求，
//! 并决定是否启用联网检索。

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::{Content, GenerationRequest, Message, MessageRole, Tool};

/// 注入文档的字符上限（前缀截断，不做语义切分）
pub const DOCUMENT_CHAR_BUDGET: usize = 2500;

/// 助手行为约束，每次请求都放在最前面
pub const SYSTEM_INSTRUCTION: &str = "You are a revision assistant helping a student study. \
When document context is provided, base your answers on it and cite it. \
Do not fabricate facts; if the context does not contain the answer, say so plainly.";

/// 需要最新信息的提问
static RECENCY_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(latest|recent news|current events|today|this week|breaking)\b")
        .expect("valid recency pattern")
});

/// 组装结果
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub request: GenerationRequest,
    pub use_external_tool: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// 组装请求
    ///
    /// # 参数
    /// - `document_text`: 当前文档文本（可能没有）
    /// - `history`: 会话中此前的消息，按原顺序保留
    /// - `current_message`: 本次用户输入
    pub fn build(
        &self,
        document_text: Option<&str>,
        history: &[Message],
        current_message: &str,
    ) -> AssembledContext {
        let doc_excerpt = document_text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| excerpt(t, DOCUMENT_CHAR_BUDGET));

        let use_external_tool = doc_excerpt.is_none() || has_recency_intent(current_message);

        let system_instruction = match &doc_excerpt {
            Some(text) => format!(
                "{}\n\nDocument context:\n\"\"\"\n{}\n\"\"\"",
                SYSTEM_INSTRUCTION, text
            ),
            None => SYSTEM_INSTRUCTION.to_string(),
        };

        let mut contents: Vec<Content> = history
            .iter()
            .map(|m| match m.role {
                MessageRole::User => Content::user(m.text.clone()),
                MessageRole::Assistant => Content::model(m.text.clone()),
            })
            .collect();
        contents.push(Content::user(current_message));

        let tools = if use_external_tool {
            vec![Tool::WebSearch]
        } else {
            Vec::new()
        };

        debug!(
            "组装上下文: 历史 {} 条, 文档摘录 {} 字符, 联网检索: {}",
            history.len(),
            doc_excerpt.as_ref().map(|t| t.chars().count()).unwrap_or(0),
            use_external_tool
        );

        AssembledContext {
            request: GenerationRequest::new(contents)
                .with_system_instruction(system_instruction)
                .with_tools(tools),
            use_external_tool,
        }
    }
}

/// 提问是否需要最新信息
pub fn has_recency_intent(message: &str) -> bool {
    RECENCY_INTENT.is_match(message)
}

/// 取前 `budget` 个字符
pub fn excerpt(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
