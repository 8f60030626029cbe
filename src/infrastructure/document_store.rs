//! 文档存储 - 基础设施层
//!
//! 每个用户一个只追加的 Attempt 集合；写入即创建，读取是对整个集合的实时查询。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::models::{Attempt, UserScope};

/// 远端文档存储
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 以 `attempt.id` 为键创建一条新文档
    async fn create(&self, scope: &UserScope, attempt: &Attempt) -> Result<(), PersistError>;

    /// 实时查询：返回集合当前内容，之后每次写入都会推送新快照（未排序）
    fn watch(&self, scope: &UserScope) -> watch::Receiver<Vec<Attempt>>;
}

/// 本地存储：内存集合，可选持久化到 `<dir>/<hex(scope)>.json`
pub struct LocalDocumentStore {
    dir: Option<PathBuf>,
    collections: Mutex<HashMap<UserScope, Arc<watch::Sender<Vec<Attempt>>>>>,
    /// 串行化写入，保证文件内容与内存快照一致
    write_lock: tokio::sync::Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    scope: UserScope,
    attempts: Vec<Attempt>,
}

impl LocalDocumentStore {
    /// 纯内存存储
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            collections: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 打开持久化目录并加载已有集合
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistError::io(dir.display().to_string(), e))?;

        let mut collections = HashMap::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| PersistError::io(dir.display().to_string(), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match load_collection(&path).await {
                Ok(file) => {
                    info!("成功加载 {} 条进度记录 ({})", file.attempts.len(), file.scope);
                    let (tx, _) = watch::channel(file.attempts);
                    collections.insert(file.scope, Arc::new(tx));
                }
                Err(e) => warn!("加载进度文件失败 {}: {}", path.display(), e),
            }
        }

        Ok(Self {
            dir: Some(dir),
            collections: Mutex::new(collections),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn sender(&self, scope: &UserScope) -> Arc<watch::Sender<Vec<Attempt>>> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(watch::channel(Vec::new()).0))
            .clone()
    }

    fn file_path(&self, scope: &UserScope) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", file_stem(scope.as_str()))))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn create(&self, scope: &UserScope, attempt: &Attempt) -> Result<(), PersistError> {
        let _write = self.write_lock.lock().await;
        let sender = self.sender(scope);

        let mut snapshot = sender.borrow().clone();
        if snapshot.iter().any(|a| a.id == attempt.id) {
            return Err(PersistError::Rejected(format!(
                "文档 {} 已存在",
                attempt.id
            )));
        }
        snapshot.push(attempt.clone());

        if let Some(path) = self.file_path(scope) {
            let file = CollectionFile {
                scope: scope.clone(),
                attempts: snapshot.clone(),
            };
            let json = serde_json::to_string_pretty(&file)?;
            fs::write(&path, json)
                .await
                .map_err(|e| PersistError::io(path.display().to_string(), e))?;
        }

        debug!("写入进度记录 {} ({})", attempt.id, scope);
        sender.send_replace(snapshot);
        Ok(())
    }

    fn watch(&self, scope: &UserScope) -> watch::Receiver<Vec<Attempt>> {
        self.sender(scope).subscribe()
    }
}

async fn load_collection(path: &Path) -> Result<CollectionFile, PersistError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PersistError::io(path.display().to_string(), e))?;
    Ok(serde_json::from_str(&content)?)
}

/// 用户 id 转为文件名：逐字节十六进制编码，不同 id 不会落到同一个文件
fn file_stem(scope: &str) -> String {
    scope.bytes().map(|b| format!("{:02x}", b)).collect()
}
