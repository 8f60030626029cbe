//! 结构化生成客户端 - 业务能力层
//!
//! 包装一次生成调用，负责重试、退避和输出校验。
//! 本身无状态，可并发调用；同一目标的单飞由调用方保证。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clients::GenerationBackend;
use crate::error::{GenerationError, TransportError};
use crate::models::{GenerationRequest, GenerationResponse};
use crate::services::decoder::decode;

/// 重试策略
///
/// 第 n 次失败后等待 `base_delay × 2^(n-1)`：1s、2s、4s。
/// 最后一次失败后同样等待，再把失败交给调用方，默认最坏约 7s。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// 第 `failed_attempt` 次失败后的等待时间（从 1 开始）
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempt.saturating_sub(1))
    }
}

/// 单次尝试的失败原因
#[derive(Debug)]
enum AttemptFailure {
    Transport(TransportError),
    Malformed(String),
}

/// 结构化生成客户端
#[derive(Clone)]
pub struct StructuredClient {
    backend: Arc<dyn GenerationBackend>,
    policy: RetryPolicy,
}

impl StructuredClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn GenerationBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// 请求自由文本（对话回复）
    ///
    /// 空文本视为输出格式错误，同样参与重试。
    pub async fn request_text(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        self.with_retry("text", request.content_chars(), || async move {
            let response = self
                .backend
                .generate(request)
                .await
                .map_err(AttemptFailure::Transport)?;
            if response.text.trim().is_empty() {
                return Err(AttemptFailure::Malformed("响应文本为空".to_string()));
            }
            Ok(response)
        })
        .await
    }

    /// 请求结构化数据
    ///
    /// # 参数
    /// - `request`: 生成请求，`output_schema` 用于本地校验
    /// - `check`: 解码后的额外形状检查，返回 Err 视为输出格式错误
    ///
    /// # 返回
    /// 重试耗尽后返回最后一次失败
    pub async fn request_structured<T, F>(
        &self,
        request: &GenerationRequest,
        check: F,
    ) -> Result<T, GenerationError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Result<(), String>,
    {
        let check = &check;
        self.with_retry("structured", request.content_chars(), || async move {
            let response = self
                .backend
                .generate(request)
                .await
                .map_err(AttemptFailure::Transport)?;

            let value: T = decode(&response.text, request.output_schema.as_ref())
                .into_result()
                .map_err(AttemptFailure::Malformed)?;
            check(&value).map_err(AttemptFailure::Malformed)?;
            Ok(value)
        })
        .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        label: &str,
        request_chars: usize,
        mut op: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(
                "[{}] 第 {}/{} 次调用 {}，请求 {} 字符",
                label,
                attempt,
                max_attempts,
                self.model_name(),
                request_chars
            );

            let failure = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("[{}] ✓ 第 {} 次尝试成功", label, attempt);
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let delay = self.policy.delay_after(attempt);
            if attempt >= max_attempts {
                error!("[{}] ❌ 已重试 {} 次仍失败: {:?}", label, attempt, failure);
                sleep(delay).await;
                return Err(match failure {
                    AttemptFailure::Transport(e) => GenerationError::Transport {
                        attempts: attempt,
                        message: e.to_string(),
                    },
                    AttemptFailure::Malformed(message) => GenerationError::MalformedOutput {
                        attempts: attempt,
                        message,
                    },
                });
            }

            warn!(
                "[{}] ⚠️ 第 {}/{} 次尝试失败: {:?}，{:?} 后重试",
                label, attempt, max_attempts, failure, delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
