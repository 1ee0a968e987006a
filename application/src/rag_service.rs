use crate::indexer::{IndexStats, Indexer};
use crate::prompt::PromptTemplate;
use domain::error::RagError;
use domain::language_model::{CompletionModel, EmbeddingModel, QuestionAnswering};
use domain::models::{Answer, ScoredChunk};
use infrastructure::config::{ModelConfig, RetrievalConfig};
use infrastructure::vector_store::MemoryVectorStore;
use shared::telemetry::Telemetry;
use shared::types::Result;
use std::path::Path;
use tracing::{debug, info};

/// Conservative estimate for Llama tokenizers on English text.
pub const CHARS_PER_TOKEN: usize = 3;

/// Prompt size in chars that leaves `max_tokens` of the window for the answer.
pub fn context_budget_chars(model: &ModelConfig) -> usize {
    model.n_ctx.saturating_sub(model.max_tokens) as usize * CHARS_PER_TOKEN
}

/// The QA chain: owns the model handle and the read-only vector store.
pub struct RagService<M> {
    model: M,
    store: MemoryVectorStore,
    prompt: PromptTemplate,
    top_k: usize,
    prompt_budget: Option<usize>,
}

impl<M> RagService<M>
where
    M: EmbeddingModel + CompletionModel,
{
    pub fn new(model: M, store: MemoryVectorStore, prompt: PromptTemplate, top_k: usize) -> Self {
        Self {
            model,
            store,
            prompt,
            top_k,
            prompt_budget: None,
        }
    }

    /// Cap the formatted prompt at `chars`. Lowest-scored chunks are dropped
    /// first; a lone chunk that still does not fit is cut.
    pub fn with_prompt_budget(mut self, chars: usize) -> Self {
        self.prompt_budget = Some(chars);
        self
    }

    /// Index `docs_dir` with `model` and wrap the result.
    pub async fn build(
        model: M,
        docs_dir: &Path,
        retrieval: &RetrievalConfig,
        prompt: PromptTemplate,
    ) -> Result<(Self, IndexStats)> {
        let (store, stats) = Indexer::new(&model, docs_dir, retrieval)?.build().await?;
        Ok((Self::new(model, store, prompt, retrieval.top_k), stats))
    }

    pub async fn query(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery.into());
        }
        let timer = Telemetry::new();

        let query_embedding = self.model.embed_query(question).await?;
        let mut sources = self.store.similarity_search(&query_embedding, self.top_k)?;
        debug!(
            retrieved = sources.len(),
            ids = ?sources.iter().map(|s| s.chunk.id.as_str()).collect::<Vec<_>>(),
            "retrieved context"
        );
        if let Some(budget) = self.prompt_budget {
            self.fit_to_budget(&mut sources, question, budget);
        }

        let context = join_context(&sources);
        let prompt = self.prompt.format(&context, question);
        let text = self.model.complete(&prompt).await?;
        info!(elapsed_ms = timer.elapsed_ms(), sources = sources.len(), "answered question");

        Ok(Answer {
            question: question.to_string(),
            text: text.trim().to_string(),
            sources,
        })
    }

    fn fit_to_budget(&self, sources: &mut Vec<ScoredChunk>, question: &str, budget: usize) {
        let overhead = self.prompt.format("", question).chars().count();
        let available = budget.saturating_sub(overhead) / self.prompt.context_slots().max(1);

        let mut used = 0;
        let mut kept = 0;
        for source in sources.iter() {
            let joiner = if kept == 0 { 0 } else { CONTEXT_SEPARATOR.len() };
            let len = source.chunk.text.chars().count();
            if used + joiner + len > available {
                break;
            }
            used += joiner + len;
            kept += 1;
        }

        if kept == sources.len() {
            return;
        }
        let retrieved = sources.len();
        if kept == 0 && available > 0 {
            sources.truncate(1);
            if let Some(top) = sources.first_mut() {
                top.chunk.text = top.chunk.text.chars().take(available).collect();
            }
        } else {
            sources.truncate(kept);
        }
        info!(
            retrieved,
            kept = sources.len(),
            budget,
            "trimmed context to fit the model window"
        );
    }

    pub fn store(&self) -> &MemoryVectorStore {
        &self.store
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

const CONTEXT_SEPARATOR: &str = "\n\n";

fn join_context(sources: &[ScoredChunk]) -> String {
    sources
        .iter()
        .map(|s| s.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

impl<M> QuestionAnswering for RagService<M>
where
    M: EmbeddingModel + CompletionModel,
{
    async fn answer(&self, question: &str) -> Result<Answer> {
        self.query(question).await
    }
}
