pub mod context_assembler;
pub mod decoder;
pub mod progress_sync;
pub mod structured_client;

pub use context_assembler::{AssembledContext, ContextAssembler};
pub use decoder::{decode, Decoded};
pub use progress_sync::{ProgressSync, RecordState, Subscription};
pub use structured_client::{RetryPolicy, StructuredClient};
