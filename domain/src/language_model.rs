use crate::models::Answer;
use shared::types::Result;
use std::future::Future;

/// Turns text into vectors. Documents and queries go through the same model.
pub trait EmbeddingModel: Send + Sync {
    fn embed_documents(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    fn embed_query(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

pub trait CompletionModel: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Maps one question to one answer; what the interactive loop drives.
pub trait QuestionAnswering {
    fn answer(&self, question: &str) -> impl Future<Output = Result<Answer>>;
}
