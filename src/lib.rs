//! # Revision Assistant
//!
//! 学习复习助手的客户端核心：根据文档出题、评分、对话问答、记录学习进度。
//! 作为嵌入式模块使用，没有命令行入口。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `clients/` - 生成服务后端，统一实现 `GenerationBackend`
//! - `infrastructure/` - 进度文档存储，身份和文本提取协作方接口
//!
//! ### ② 业务能力层（Services）
//! - `StructuredClient` - 重试、退避、输出校验
//! - `ContextAssembler` - 文档摘录 + 历史 + 联网检索判断
//! - `ProgressSync` - 进度写入和实时历史订阅
//!
//! ### ③ 流程层（Workflow）
//! - `QuizEngine` - 出题 → 作答 → 提交评分
//! - `ChatSessionManager` - 多线程对话，每个线程单飞发送
//!
//! ### ④ 编排层（Orchestration）
//! - `RevisionSession` - 会话上下文，`initialize` / `shutdown`
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{GenerationBackend, ScriptedBackend};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{DocumentStore, LocalDocumentStore, StaticIdentity};
pub use models::{Attempt, QuestionKind, QuestionSet, ScoreReport, UserScope};
pub use orchestrator::RevisionSession;
pub use services::{StructuredClient, Subscription};
pub use workflow::{ChatSessionManager, QuizEngine};
