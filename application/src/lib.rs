pub mod indexer;
pub mod prompt;
pub mod rag_service;
