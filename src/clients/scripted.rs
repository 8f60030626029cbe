//! 预设回复的生成后端
//!
//! 按顺序返回预先排好的结果，记录收到的请求。
//! 用于测试，也可供宿主程序离线演示。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::clients::GenerationBackend;
use crate::error::TransportError;
use crate::models::{GenerationRequest, GenerationResponse};

/// 一条预设结果
pub enum ScriptedReply {
    Respond(GenerationResponse),
    Fail(String),
}

pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    /// 设置后每次调用需要先取得一个许可，用来模拟挂起的请求
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// 调用会挂起，直到 `gate` 上有可用许可
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push(ScriptedReply::Respond(GenerationResponse::text(text)))
    }

    pub fn push_response(&self, response: GenerationResponse) -> &Self {
        self.push(ScriptedReply::Respond(response))
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(ScriptedReply::Fail(message.into()))
    }

    fn push(&self, reply: ScriptedReply) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的请求副本
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| TransportError::Api(e.to_string()))?;
            permit.forget();
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match reply {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(message)) => Err(TransportError::Api(message)),
            None => Err(TransportError::EmptyResponse {
                model: "scripted".to_string(),
            }),
        }
    }
}
