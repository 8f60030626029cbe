//! 进度同步 - 业务能力层
//!
//! 只负责两件事：
//! - 把完成的测验记录写入文档存储（不等待结果，失败只记日志）
//! - 提供按时间倒序的实时历史视图
//!
//! 存储推送的快照是唯一权威来源；本地只额外记录"已提交但未确认"的记录，
//! 不与远端结果做合并。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, Stream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::infrastructure::DocumentStore;
use crate::models::{Attempt, ProgressSummary, UserScope};

/// 记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// 已提交写入，尚未出现在存储中
    Pending,
    /// 存储已确认
    Confirmed,
}

type Registry = Arc<Mutex<HashMap<UserScope, watch::Sender<u64>>>>;

/// 进度同步器
pub struct ProgressSync {
    store: Arc<dyn DocumentStore>,
    scope: UserScope,
    pending: Arc<Mutex<Vec<Attempt>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    registry: Registry,
    next_token: AtomicU64,
}

impl ProgressSync {
    pub fn new(store: Arc<dyn DocumentStore>, scope: UserScope) -> Self {
        Self {
            store,
            scope,
            pending: Arc::new(Mutex::new(Vec::new())),
            tasks: Mutex::new(Vec::new()),
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn scope(&self) -> &UserScope {
        &self.scope
    }

    /// 后台写入一条记录，调用方不等待
    ///
    /// 写入失败只记录警告：测验结果已经在本地展示过了。
    pub fn record(&self, attempt: Attempt) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("⚠️ 没有可用的异步运行时，进度记录 {} 未写入", attempt.id);
            return;
        };
        lock(&self.pending).push(attempt.clone());

        let store = Arc::clone(&self.store);
        let scope = self.scope.clone();
        let pending = Arc::clone(&self.pending);
        let handle = runtime.spawn(async move {
            match store.create(&scope, &attempt).await {
                Ok(()) => info!("✓ 进度记录已保存: {} ({}/{})", attempt.title, attempt.score, attempt.total),
                Err(e) => warn!("⚠️ 进度记录写入失败（不影响本次结果）: {}", e),
            }
            lock(&pending).retain(|a| a.id != attempt.id);
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// 直接写入并返回结果
    pub async fn persist(&self, attempt: &Attempt) -> Result<(), PersistError> {
        self.store.create(&self.scope, attempt).await
    }

    /// 等待所有后台写入结束
    pub async fn flush(&self) {
        let tasks: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("进度写入任务异常结束: {}", e);
            }
        }
    }

    /// 尚未确认的记录
    pub fn pending(&self) -> Vec<Attempt> {
        lock(&self.pending).clone()
    }

    pub fn record_state(&self, attempt_id: &str) -> Option<RecordState> {
        if lock(&self.pending).iter().any(|a| a.id == attempt_id) {
            return Some(RecordState::Pending);
        }
        let confirmed = self
            .store
            .watch(&self.scope)
            .borrow()
            .iter()
            .any(|a| a.id == attempt_id);
        confirmed.then_some(RecordState::Confirmed)
    }

    /// 订阅某个用户的历史
    ///
    /// 同一作用域只保留一个有效订阅，新的订阅会让旧的失效。
    pub fn subscribe(&self, scope: &UserScope) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let active = {
            let mut registry = lock(&self.registry);
            match registry.get(scope) {
                Some(sender) => {
                    info!("🔁 作用域 {} 的旧订阅已被替换", scope);
                    sender.send_replace(token);
                    sender.subscribe()
                }
                None => {
                    let (sender, receiver) = watch::channel(token);
                    registry.insert(scope.clone(), sender);
                    receiver
                }
            }
        };
        debug!("订阅进度历史: {} (token {})", scope, token);

        Subscription {
            scope: scope.clone(),
            token,
            attempts: self.store.watch(scope),
            active,
            registry: Arc::clone(&self.registry),
            delivered_initial: false,
        }
    }

    /// 当前历史的汇总
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_attempts(&self.store.watch(&self.scope).borrow())
    }
}

/// 历史订阅句柄
///
/// 不再需要时调用 `release`，drop 也会释放。
pub struct Subscription {
    scope: UserScope,
    token: u64,
    attempts: watch::Receiver<Vec<Attempt>>,
    active: watch::Receiver<u64>,
    registry: Registry,
    delivered_initial: bool,
}

impl Subscription {
    pub fn scope(&self) -> &UserScope {
        &self.scope
    }

    /// 是否仍是该作用域的有效订阅
    pub fn is_active(&self) -> bool {
        *self.active.borrow() == self.token
    }

    /// 当前快照，按时间倒序
    pub fn current(&self) -> Vec<Attempt> {
        newest_first(self.attempts.borrow().clone())
    }

    /// 下一份快照
    ///
    /// 第一次调用立即返回当前内容；之后等待存储变化。
    /// 订阅被替换、释放或存储关闭时返回 None。
    pub async fn next(&mut self) -> Option<Vec<Attempt>> {
        if !self.is_active() {
            return None;
        }
        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(newest_first(self.attempts.borrow_and_update().clone()));
        }

        let token = self.token;
        tokio::select! {
            changed = self.attempts.changed() => {
                changed.ok()?;
            }
            _ = superseded(&mut self.active, token) => return None,
        }

        if !self.is_active() {
            return None;
        }
        Some(newest_first(self.attempts.borrow_and_update().clone()))
    }

    /// 转换为异步流
    pub fn into_stream(self) -> impl Stream<Item = Vec<Attempt>> {
        stream::unfold(self, |mut sub| async move {
            let snapshot = sub.next().await?;
            Some((snapshot, sub))
        })
    }

    /// 释放订阅
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        let still_active = registry
            .get(&self.scope)
            .is_some_and(|sender| *sender.borrow() == self.token);
        if still_active {
            registry.remove(&self.scope);
            debug!("释放进度订阅: {} (token {})", self.scope, self.token);
        }
    }
}

/// 等到 token 不再是当前有效值
async fn superseded(active: &mut watch::Receiver<u64>, token: u64) {
    loop {
        if *active.borrow_and_update() != token {
            return;
        }
        if active.changed().await.is_err() {
            return;
        }
    }
}

/// 按时间倒序；时间相同保持存储中的插入顺序
fn newest_first(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
    attempts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    attempts
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
