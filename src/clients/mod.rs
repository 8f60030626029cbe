//! 生成服务客户端
//!
//! 所有后端实现同一个 `GenerationBackend` trait，上层只依赖 trait。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, Provider};
use crate::error::TransportError;
use crate::models::{GenerationRequest, GenerationResponse};

pub mod gemini_client;
pub mod openai_client;
pub mod scripted;

pub use gemini_client::GeminiClient;
pub use openai_client::OpenAiClient;
pub use scripted::{ScriptedBackend, ScriptedReply};

/// 生成后端：发送一次请求，返回一次响应，不做重试
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError>;
}

/// 按配置创建后端
pub fn backend_from_config(config: &Config) -> Arc<dyn GenerationBackend> {
    match config.provider {
        Provider::Gemini => Arc::new(GeminiClient::new(config)),
        Provider::OpenAi => Arc::new(OpenAiClient::new(config)),
    }
}
