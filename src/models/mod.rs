pub mod attempt;
pub mod chat;
pub mod document;
pub mod generation;
pub mod question;

pub use attempt::{Attempt, ProgressSummary, UserScope};
pub use chat::{ChatThread, Message, MessageRole, Source, ThreadId};
pub use document::{Document, DocumentLibrary, DocumentOrigin, ExtractionStatus};
pub use generation::{
    Content, GenerationRequest, GenerationResponse, GroundingSource, Part, Role, Tool,
};
pub use question::{Answers, Question, QuestionKind, QuestionResult, QuestionSet, ScoreReport};
