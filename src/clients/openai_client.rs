//! 兼容 OpenAI 的生成客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//!
//! Chat Completions 没有联网检索和来源标注，工具声明会被忽略；
//! 输出结构以 JSON 形式附在系统消息里，返回后仍由调用方本地校验。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::GenerationBackend;
use crate::config::Config;
use crate::error::TransportError;
use crate::models::{GenerationRequest, GenerationResponse, Role};

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
}

impl OpenAiClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
        }
    }

    fn build_messages(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, TransportError> {
        let mut messages = Vec::new();

        if let Some(system) = system_text(request) {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| TransportError::Api(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        for content in &request.contents {
            let text = content.text();
            let message = match content.role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(text)
                        .build()
                        .map_err(|e| TransportError::Api(e.to_string()))?,
                ),
                Role::Model => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(text)
                        .build()
                        .map_err(|e| TransportError::Api(e.to_string()))?,
                ),
            };
            messages.push(message);
        }

        Ok(messages)
    }
}

/// 系统消息：系统指令 + 输出结构说明
fn system_text(request: &GenerationRequest) -> Option<String> {
    let schema_note = request.output_schema.as_ref().map(|schema| {
        format!(
            "Respond with JSON only, no prose and no code fences. The JSON must match this schema:\n{}",
            schema
        )
    });

    match (&request.system_instruction, schema_note) {
        (Some(instruction), Some(note)) => Some(format!("{}\n\n{}", instruction, note)),
        (Some(instruction), None) => Some(instruction.clone()),
        (None, note) => note,
    }
}

#[async_trait]
impl GenerationBackend for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        if !request.tools.is_empty() {
            debug!("当前服务不支持联网检索，忽略 {} 个工具声明", request.tools.len());
        }

        let messages = self.build_messages(request)?;

        // 构建请求
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| TransportError::Api(e.to_string()))?;

        // 调用 API
        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            TransportError::Api(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| TransportError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        Ok(GenerationResponse::text(content.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Content;
    use serde_json::json;

    #[test]
    fn test_system_text_appends_schema() {
        let request = GenerationRequest::new(vec![Content::user("q")])
            .with_system_instruction("You are a tutor.")
            .with_output_schema(json!({"type": "object"}));

        let text = system_text(&request).unwrap();
        assert!(text.starts_with("You are a tutor."));
        assert!(text.contains("\"type\":\"object\""));
    }

    #[test]
    fn test_system_text_absent_without_instruction_or_schema() {
        let request = GenerationRequest::new(vec![Content::user("q")]);
        assert!(system_text(&request).is_none());
    }

    #[test]
    fn test_history_roles_map_to_chat_messages() {
        let client = OpenAiClient::new(&Config::default());
        let request = GenerationRequest::new(vec![
            Content::user("first"),
            Content::model("reply"),
            Content::user("second"),
        ])
        .with_system_instruction("sys");

        let messages = client.build_messages(&request).unwrap();
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }
}
