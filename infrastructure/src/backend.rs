use crate::config::{Backend, Config};
use crate::llama_server::LlamaRuntime;
use crate::ollama_client::OllamaClient;
use domain::language_model::{CompletionModel, EmbeddingModel};
use shared::types::Result;

/// The inference handle selected by configuration.
pub enum ModelBackend {
    Llama(LlamaRuntime),
    Ollama(OllamaClient),
}

impl ModelBackend {
    /// Load the model. Any failure here is fatal for the caller.
    pub async fn load(config: &Config) -> Result<Self> {
        match config.backend {
            Backend::Llama => Ok(Self::Llama(
                LlamaRuntime::load(&config.model, &config.server).await?,
            )),
            Backend::Ollama => Ok(Self::Ollama(
                OllamaClient::connect(&config.ollama, &config.model).await?,
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Llama(_) => "llama.cpp",
            Self::Ollama(_) => "ollama",
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        match self {
            Self::Llama(runtime) => runtime.shutdown().await,
            Self::Ollama(_) => Ok(()),
        }
    }
}

impl EmbeddingModel for ModelBackend {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Llama(m) => m.embed_documents(texts).await,
            Self::Ollama(m) => m.embed_documents(texts).await,
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            Self::Llama(m) => m.embed_query(text).await,
            Self::Ollama(m) => m.embed_query(text).await,
        }
    }
}

impl CompletionModel for ModelBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            Self::Llama(m) => m.complete(prompt).await,
            Self::Ollama(m) => m.complete(prompt).await,
        }
    }
}
