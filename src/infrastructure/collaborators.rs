//! 外部协作方接口
//!
//! 身份和文本提取由宿主程序提供，这里只定义接口。

use async_trait::async_trait;

use crate::models::ExtractionStatus;

/// 身份提供方：给出稳定的不透明用户 id，只用于划分存储范围
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_id(&self) -> Result<String, String>;
}

/// 固定用户 id
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn user_id(&self) -> Result<String, String> {
        if self.0.trim().is_empty() {
            Err("用户 id 为空".to_string())
        } else {
            Ok(self.0.clone())
        }
    }
}

/// 文本提取：根据文档引用返回纯文本或加载状态
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, reference: &str) -> ExtractionStatus;
}
