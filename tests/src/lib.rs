//! Deterministic stand-ins for the model so the pipeline runs without a
//! `llama-server` binary.

use anyhow::anyhow;
use domain::language_model::{CompletionModel, EmbeddingModel};
use shared::types::Result;
use std::path::Path;
use std::sync::Mutex;

pub const DEFAULT_DIMENSION: usize = 512;

/// Bag-of-words embeddings: lowercase alphanumeric tokens hashed into a
/// fixed number of buckets, then L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let digest = md5::compute(token.as_bytes());
            let bucket = digest.0[..8]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            vector[(bucket % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl EmbeddingModel for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}

/// Hash embeddings plus a completion model that records every prompt and
/// replies with a canned answer. Prompts containing `fail_marker` fail.
pub struct FakeLlama {
    embedder: HashEmbedder,
    reply: String,
    fail_marker: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlama {
    pub fn new(reply: &str) -> Self {
        Self {
            embedder: HashEmbedder::default(),
            reply: reply.to_string(),
            fail_marker: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl EmbeddingModel for FakeLlama {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed_query(text).await
    }
}

impl CompletionModel for FakeLlama {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.fail_marker {
            Some(marker) if prompt.contains(marker.as_str()) => {
                Err(anyhow!("llama-server returned 500 Internal Server Error"))
            }
            _ => Ok(self.reply.clone()),
        }
    }
}

/// Write `(relative path, contents)` pairs under `root`, creating folders.
pub fn write_docs(root: &Path, docs: &[(&str, &str)]) -> Result<()> {
    for (name, contents) in docs {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
    }
    Ok(())
}
