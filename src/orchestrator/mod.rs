//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 持有一次复习会话的全部组件，管理会话生命周期（初始化、收尾）。
//!
//! ## 层次关系
//!
//! ```text
//! session::RevisionSession (文档选择 + 转发)
//!     ↓
//! workflow (QuizEngine / ChatSessionManager)
//!     ↓
//! services (StructuredClient / ContextAssembler / ProgressSync)
//!     ↓
//! clients + infrastructure (GenerationBackend / DocumentStore)
//! ```
//!
//! 本层不做业务判断，只决定把哪份文档交给哪个组件。

pub mod session;

pub use session::RevisionSession;
