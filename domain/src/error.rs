use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RagError {
    #[error("question is empty")]
    EmptyQuery,

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk '{0}' is already in the store")]
    DuplicateChunk(String),

    #[error("invalid prompt template: {0}")]
    InvalidTemplate(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
