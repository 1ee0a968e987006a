use anyhow::anyhow;
use domain::language_model::EmbeddingModel;
use domain::models::{Chunk, EmbeddedChunk};
use futures::stream::{self, StreamExt, TryStreamExt};
use shared::types::Result;
use tracing::debug;

/// Sends chunk texts to the model and pairs each chunk with its vector.
pub struct Embedder<'a, M> {
    model: &'a M,
    batch_size: usize,
    concurrency: usize,
}

impl<'a, M: EmbeddingModel> Embedder<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            batch_size: 1,
            concurrency: 1,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Output order equals input order.
    pub async fn generate_embeddings(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>> {
        let total = chunks.len();
        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.to_vec())
            .collect();

        let embedded: Vec<Vec<EmbeddedChunk>> = stream::iter(batches)
            .map(|batch| self.generate_batch_embeddings(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let embeddings: Vec<EmbeddedChunk> = embedded.into_iter().flatten().collect();
        debug!(chunks = total, "embedded all chunks");
        Ok(embeddings)
    }

    async fn generate_batch_embeddings(&self, batch: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.model.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(anyhow!(
                "model returned {} embeddings for {} texts",
                vectors.len(),
                batch.len()
            ));
        }
        Ok(batch
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect())
    }
}
