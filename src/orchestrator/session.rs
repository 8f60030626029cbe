//! 复习会话 - 编排层
//!
//! 显式的会话上下文：`initialize` 创建并持有所有组件，`shutdown` 收尾。
//! 各组件只通过自己的接口修改自己的状态，本层只做转发和文档选择。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::clients::{backend_from_config, GenerationBackend};
use crate::config::Config;
use crate::error::{AppError, AppResult, ChatError, QuizError};
use crate::infrastructure::{
    DocumentStore, IdentityProvider, LocalDocumentStore, TextExtractor,
};
use crate::models::{
    ChatThread, Document, DocumentLibrary, ExtractionStatus, ProgressSummary, QuestionKind,
    QuestionSet, ScoreReport, ThreadId, UserScope,
};
use crate::services::{ProgressSync, StructuredClient, Subscription};
use crate::utils::logging;
use crate::workflow::{ChatSessionManager, QuizEngine, MIN_DOCUMENT_CHARS};

/// 一次复习会话
pub struct RevisionSession {
    user: UserScope,
    model_name: String,
    documents: Mutex<DocumentLibrary>,
    quiz: QuizEngine,
    chat: ChatSessionManager,
    progress: Arc<ProgressSync>,
}

impl RevisionSession {
    /// 初始化会话
    ///
    /// 1. 初始化日志（已初始化时忽略）
    /// 2. 向身份提供方获取用户 id
    /// 3. 按配置创建生成后端和进度存储
    pub async fn initialize(config: &Config, identity: &dyn IdentityProvider) -> AppResult<Self> {
        if let Err(e) = logging::init(config.verbose_logging) {
            debug!("日志已初始化: {}", e);
        }

        let user_id = identity.user_id().await.map_err(AppError::Identity)?;
        let backend = backend_from_config(config);

        let store: Arc<dyn DocumentStore> = match config.store_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => {
                info!("📂 进度存储目录: {}", dir);
                Arc::new(LocalDocumentStore::open(dir).await?)
            }
            _ => Arc::new(LocalDocumentStore::in_memory()),
        };

        logging::log_startup(&user_id, backend.model_name());
        Ok(Self::with_parts(UserScope::new(user_id), backend, store))
    }

    /// 用现成的组件组装会话
    pub fn with_parts(
        user: UserScope,
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let client = StructuredClient::new(backend);
        let progress = Arc::new(ProgressSync::new(store, user.clone()));

        Self {
            model_name: client.model_name().to_string(),
            user,
            documents: Mutex::new(DocumentLibrary::new()),
            quiz: QuizEngine::new(client.clone(), Arc::clone(&progress)),
            chat: ChatSessionManager::new(client),
            progress,
        }
    }

    pub fn user(&self) -> &UserScope {
        &self.user
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn quiz(&self) -> &QuizEngine {
        &self.quiz
    }

    pub fn chat(&self) -> &ChatSessionManager {
        &self.chat
    }

    pub fn progress(&self) -> &ProgressSync {
        &self.progress
    }

    fn documents(&self) -> MutexGuard<'_, DocumentLibrary> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== 文档 ==========

    /// 添加内置文档，返回文档 id
    pub fn add_builtin_document(&self, name: &str, text: &str) -> String {
        let document = Document::builtin(name, text);
        let id = document.id.clone();
        let mut documents = self.documents();
        documents.add_builtin(document);
        if documents.active().is_none() {
            documents.select(&id);
        }
        id
    }

    /// 上传文档并等待文本提取；旧的上传文档被替换
    pub async fn upload_document(
        &self,
        name: &str,
        reference: &str,
        extractor: &dyn TextExtractor,
    ) -> String {
        let document = Document::uploaded(name);
        let id = document.id.clone();
        self.documents().replace_uploaded(document);
        info!("📄 上传文档: {}", name);

        let status = extractor.extract(reference).await;
        match &status {
            ExtractionStatus::Ready(text) => info!("✓ 文本提取完成: {} 字符", text.chars().count()),
            ExtractionStatus::Failed(reason) => warn!("⚠️ 文本提取失败: {}", reason),
            ExtractionStatus::Loading => debug!("文本仍在提取中: {}", name),
        }

        if !self.documents().update_extraction(&id, status) {
            debug!("上传文档 {} 已被替换，忽略提取结果", name);
        }
        id
    }

    /// 更新上传文档的提取状态（提取由宿主程序异步完成时使用）
    pub fn update_extraction(&self, document_id: &str, status: ExtractionStatus) -> bool {
        self.documents().update_extraction(document_id, status)
    }

    pub fn select_document(&self, document_id: &str) -> bool {
        self.documents().select(document_id)
    }

    pub fn active_document(&self) -> Option<Document> {
        self.documents().active().cloned()
    }

    pub fn document_list(&self) -> Vec<Document> {
        self.documents().documents().cloned().collect()
    }

    fn active_text(&self) -> Option<String> {
        self.documents().active_text().map(str::to_string)
    }

    // ========== 测验 ==========

    /// 用当前文档出题
    pub async fn generate_quiz(&self, kind: QuestionKind) -> Result<QuestionSet, QuizError> {
        let Some(text) = self.active_text() else {
            return Err(QuizError::Readiness {
                required: MIN_DOCUMENT_CHARS,
                actual: 0,
            });
        };
        self.quiz.generate(&text, kind).await
    }

    pub fn answer(&self, question_id: &str, text: &str) -> Result<(), QuizError> {
        self.quiz.answer(question_id, text)
    }

    pub fn submit_quiz(&self) -> Result<ScoreReport, QuizError> {
        self.quiz.submit()
    }

    pub fn current_quiz(&self) -> Option<QuestionSet> {
        self.quiz.current()
    }

    /// 离开测验视图：丢弃当前题集和作答
    pub fn change_view(&self) {
        self.quiz.discard();
    }

    // ========== 对话 ==========

    pub fn create_thread(&self, name: Option<&str>) -> ThreadId {
        self.chat.create_thread(name)
    }

    pub fn threads(&self) -> Vec<ChatThread> {
        self.chat.threads()
    }

    /// 发送消息，当前文档作为上下文
    pub async fn send_chat(&self, thread_id: &str, text: &str) -> Result<ChatThread, ChatError> {
        let document = self.active_text();
        self.chat.send(thread_id, text, document.as_deref()).await
    }

    // ========== 进度 ==========

    /// 订阅本用户的历史
    pub fn subscribe_progress(&self) -> Subscription {
        self.progress.subscribe(&self.user)
    }

    pub fn progress_summary(&self) -> ProgressSummary {
        self.progress.summary()
    }

    /// 结束会话：等待后台写入完成
    pub async fn shutdown(self) {
        let pending = self.progress.pending().len();
        if pending > 0 {
            info!("等待 {} 条进度记录写入...", pending);
        }
        self.progress.flush().await;
        info!("👋 会话结束: {}", self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedBackend;
    use crate::infrastructure::StaticIdentity;
    use async_trait::async_trait;

    struct FixedExtractor(ExtractionStatus);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(&self, _reference: &str) -> ExtractionStatus {
            self.0.clone()
        }
    }

    fn session() -> RevisionSession {
        RevisionSession::with_parts(
            UserScope::new("student-1"),
            Arc::new(ScriptedBackend::new()),
            Arc::new(LocalDocumentStore::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_identity() {
        let result = RevisionSession::initialize(&Config::default(), &StaticIdentity(String::new())).await;
        assert!(matches!(result, Err(AppError::Identity(_))));
    }

    #[tokio::test]
    async fn test_initialize_with_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            store_dir: Some(dir.path().display().to_string()),
            ..Config::default()
        };
        let session = RevisionSession::initialize(&config, &StaticIdentity("u-9".into()))
            .await
            .unwrap();
        assert_eq!(session.user().as_str(), "u-9");
        assert_eq!(session.model_name(), "gemini-2.5-flash");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_generate_without_document_is_not_ready() {
        let session = session();
        let err = session.generate_quiz(QuestionKind::Short).await.unwrap_err();
        assert!(matches!(err, QuizError::Readiness { actual: 0, .. }));
    }

    #[tokio::test]
    async fn test_upload_replaces_previous_and_becomes_active() {
        let session = session();
        session.add_builtin_document("Notes", "builtin text");

        let ready = FixedExtractor(ExtractionStatus::Ready("uploaded text".into()));
        let first = session.upload_document("a.pdf", "ref-a", &ready).await;
        let second = session.upload_document("b.pdf", "ref-b", &ready).await;

        let ids: Vec<String> = session.document_list().into_iter().map(|d| d.id).collect();
        assert!(!ids.contains(&first));
        assert!(ids.contains(&second));
        assert_eq!(session.active_document().unwrap().id, second);
        assert_eq!(session.active_text().as_deref(), Some("uploaded text"));
    }

    #[tokio::test]
    async fn test_loading_document_has_no_text() {
        let session = session();
        let loading = FixedExtractor(ExtractionStatus::Loading);
        let id = session.upload_document("slow.pdf", "ref", &loading).await;
        assert!(session.active_text().is_none());

        assert!(session.update_extraction(&id, ExtractionStatus::Ready("done".into())));
        assert_eq!(session.active_text().as_deref(), Some("done"));
    }

    #[test]
    fn test_first_builtin_becomes_active() {
        let session = session();
        let first = session.add_builtin_document("One", "1");
        let second = session.add_builtin_document("Two", "2");
        assert_eq!(session.active_document().unwrap().id, first);
        assert!(session.select_document(&second));
        assert!(!session.select_document("missing"));
        assert_eq!(session.active_document().unwrap().name, "Two");
    }
}
