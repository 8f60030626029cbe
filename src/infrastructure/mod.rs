pub mod collaborators;
pub mod document_store;

pub use collaborators::{IdentityProvider, StaticIdentity, TextExtractor};
pub use document_store::{DocumentStore, LocalDocumentStore};
