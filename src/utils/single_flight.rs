//! 单飞标志
//!
//! 同一目标（题集、会话）同时只允许一个进行中的操作。
//! 获取失败即拒绝，不排队、不抢占。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 占用凭证，drop 时归还许可
pub type BusyGuard = OwnedSemaphorePermit;

/// 忙碌标志：只有一个许可的信号量，克隆体共享同一状态
#[derive(Debug, Clone)]
pub struct BusyFlag {
    permits: Arc<Semaphore>,
}

impl Default for BusyFlag {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占用；已被占用时返回 None
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}
