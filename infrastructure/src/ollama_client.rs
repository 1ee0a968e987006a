use crate::config::{ModelConfig, OllamaConfig};
use anyhow::{anyhow, Context};
use domain::language_model::{CompletionModel, EmbeddingModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::types::Result;
use shared::utils::preview;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct Options {
    seed: u32,
    num_ctx: u32,
    num_predict: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: &'a Options,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

/// Client for a running Ollama daemon.
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    model: String,
    options: Arc<Options>,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig, model: &ModelConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: Arc::new(Options {
                seed: model.seed,
                num_ctx: model.n_ctx,
                num_predict: model.max_tokens,
            }),
        }
    }

    /// Fails when the daemon is unreachable.
    pub async fn connect(config: &OllamaConfig, model: &ModelConfig) -> Result<Self> {
        let client = Self::new(config, model);
        let url = format!("{}/api/tags", client.base_url);
        let response = client
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", client.base_url))?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama API error: {}", response.status()));
        }
        info!(base_url = %client.base_url, model = %client.model, "connected to Ollama");
        Ok(client)
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error: {} {}", status, text));
        }
        let embedding_response: EmbeddingResponse = response.json().await?;
        Ok(embedding_response.embedding)
    }

    pub async fn generate_response(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: &self.options,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Ollama API error: {}", text));
        }
        collect_chat_content(&text)
    }
}

/// Concatenate message content from a chat reply, single JSON or NDJSON.
/// A body with no parseable message is an error.
fn collect_chat_content(body: &str) -> Result<String> {
    let mut full_content = String::new();
    let mut parsed_any = false;
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(chat_resp) = serde_json::from_str::<ChatResponse>(line) {
            parsed_any = true;
            full_content.push_str(&chat_resp.message.content);
            if chat_resp.done {
                break;
            }
        }
    }
    if !parsed_any {
        return Err(anyhow!("unexpected Ollama chat response: {}", preview(body, 200)));
    }
    Ok(full_content)
}

impl EmbeddingModel for OllamaClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.generate_embedding(text).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embedding(text).await
    }
}

impl CompletionModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate_response(prompt).await
    }
}
