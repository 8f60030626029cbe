//! 与提供方无关的生成请求/响应结构

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 内容角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 内容片段（目前只有文本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// 一条有序的请求内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// 所有文本片段拼接
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 外部工具声明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// 联网检索，响应可能附带来源标注
    WebSearch,
}

/// 生成请求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Option<String>,
    /// 期望的输出结构（JSON Schema 子集）
    pub output_schema: Option<JsonValue>,
    pub tools: Vec<Tool>,
}

impl GenerationRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// 所有内容的字符总数（仅用于日志）
    pub fn content_chars(&self) -> usize {
        self.contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .map(|p| p.text.chars().count())
            .sum()
    }
}

/// 联网检索返回的来源标注，字段可能缺失
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// 生成响应
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    pub grounding: Vec<GroundingSource>,
}

impl GenerationResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: Vec::new(),
        }
    }
}
