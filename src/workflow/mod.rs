pub mod chat_session;
pub mod quiz_engine;
pub mod quiz_prompt;

pub use chat_session::{extract_sources, ChatSessionManager, FALLBACK_REPLY};
pub use quiz_engine::{grade, QuizEngine, MIN_DOCUMENT_CHARS};
