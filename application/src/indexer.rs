use anyhow::Context;
use domain::language_model::EmbeddingModel;
use infrastructure::config::RetrievalConfig;
use infrastructure::document_loader::DocumentLoader;
use infrastructure::embedder::Embedder;
use infrastructure::text_splitter::TextSplitter;
use infrastructure::vector_store::MemoryVectorStore;
use shared::telemetry::Telemetry;
use shared::types::Result;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub elapsed_ms: u128,
}

/// Load → split → embed → store, run once at startup.
pub struct Indexer<'a, M> {
    loader: DocumentLoader,
    splitter: TextSplitter,
    embedder: Embedder<'a, M>,
}

impl<'a, M: EmbeddingModel> Indexer<'a, M> {
    pub fn new(model: &'a M, docs_dir: impl Into<PathBuf>, retrieval: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            loader: DocumentLoader::new(docs_dir),
            splitter: TextSplitter::new(retrieval.chunk_size, retrieval.chunk_overlap)?,
            embedder: Embedder::new(model)
                .with_batch_size(retrieval.embed_batch_size)
                .with_concurrency(retrieval.embed_concurrency),
        })
    }

    pub async fn build(&self) -> Result<(MemoryVectorStore, IndexStats)> {
        let timer = Telemetry::new();
        let root = self.loader.root_path().display().to_string();

        let documents = self
            .loader
            .load()
            .with_context(|| format!("failed to load documents from {root}"))?;
        info!(documents = documents.len(), dir = %root, "loaded documents");
        if documents.is_empty() {
            warn!(dir = %root, "no documents found; answers will have no context");
        }

        let chunks = self.splitter.split_documents(&documents);
        info!(chunks = chunks.len(), chunk_size = self.splitter.chunk_size(), "split documents");

        let embedded = self
            .embedder
            .generate_embeddings(chunks)
            .await
            .context("failed to embed document chunks")?;
        let store = MemoryVectorStore::from_entries(embedded)?;

        let stats = IndexStats {
            documents: documents.len(),
            chunks: store.len(),
            dimension: store.dimension(),
            elapsed_ms: timer.elapsed_ms(),
        };
        info!(
            chunks = stats.chunks,
            dimension = ?stats.dimension,
            elapsed_ms = stats.elapsed_ms,
            "vector store ready"
        );
        Ok((store, stats))
    }
}
