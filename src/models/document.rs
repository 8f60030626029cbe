use serde::{Deserialize, Serialize};
use tracing::info;

/// 文档来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOrigin {
    Builtin,
    Uploaded,
}

/// 文本提取状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Loading,
    Ready(String),
    Failed(String),
}

/// 复习用的源文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub origin: DocumentOrigin,
    pub status: ExtractionStatus,
}

impl Document {
    pub fn builtin(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            origin: DocumentOrigin::Builtin,
            status: ExtractionStatus::Ready(text.into()),
        }
    }

    /// 上传文档，初始状态为提取中
    pub fn uploaded(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            origin: DocumentOrigin::Uploaded,
            status: ExtractionStatus::Loading,
        }
    }

    /// 提取完成后的原始文本
    pub fn text(&self) -> Option<&str> {
        match &self.status {
            ExtractionStatus::Ready(text) => Some(text),
            _ => None,
        }
    }
}

/// 文档库：内置文档 + 至多一个上传文档
#[derive(Debug, Clone, Default)]
pub struct DocumentLibrary {
    builtins: Vec<Document>,
    uploaded: Option<Document>,
    active: Option<String>,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_builtin(&mut self, document: Document) {
        self.builtins.push(document);
    }

    /// 替换上传文档，旧的上传文档被丢弃；新文档成为当前文档
    pub fn replace_uploaded(&mut self, document: Document) -> Option<Document> {
        let id = document.id.clone();
        let previous = self.uploaded.replace(document);
        if let Some(prev) = &previous {
            info!("🗑️ 丢弃旧的上传文档: {}", prev.name);
        }
        self.active = Some(id);
        previous
    }

    /// 更新上传文档的提取状态；id 不匹配时忽略
    pub fn update_extraction(&mut self, document_id: &str, status: ExtractionStatus) -> bool {
        match self.uploaded.as_mut() {
            Some(doc) if doc.id == document_id => {
                doc.status = status;
                true
            }
            _ => false,
        }
    }

    pub fn select(&mut self, document_id: &str) -> bool {
        if self.get(document_id).is_some() {
            self.active = Some(document_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn get(&self, document_id: &str) -> Option<&Document> {
        self.builtins
            .iter()
            .chain(self.uploaded.iter())
            .find(|d| d.id == document_id)
    }

    pub fn active(&self) -> Option<&Document> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    /// 当前文档已提取的文本
    pub fn active_text(&self) -> Option<&str> {
        self.active().and_then(Document::text)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.builtins.iter().chain(self.uploaded.iter())
    }
}
