//! Loads a GGUF weight file by running llama.cpp's `llama-server` against it.
//!
//! Generation and embeddings are served by separate instances. When both use
//! the same weight file with mmap enabled the OS shares the mapped pages.

use crate::config::{ModelConfig, ServerConfig};
use anyhow::{anyhow, Context};
use domain::language_model::{CompletionModel, EmbeddingModel};
use reqwest::Client;
use serde_json::{json, Value};
use shared::telemetry::Telemetry;
use shared::types::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info};

const SERVER_BINARY: &str = "llama-server";
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Generation,
    Embedding,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Generation => write!(f, "generation"),
            ServerRole::Embedding => write!(f, "embedding"),
        }
    }
}

/// Explicit path first, then `PATH`.
pub fn resolve_server_binary(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("llama-server binary not found at {}", path.display()));
    }
    which::which(SERVER_BINARY).map_err(|_| {
        anyhow!("{SERVER_BINARY} not found on PATH; install llama.cpp or set LLAMA_SERVER_PATH")
    })
}

/// Command-line flags for one server instance.
pub fn build_args(model_path: &Path, config: &ModelConfig, port: u16, role: ServerRole) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        model_path.to_string_lossy().to_string(),
        "--host".to_string(),
        "127.0.0.1".to_string(),
        "--port".to_string(),
        port.to_string(),
        "-c".to_string(),
        config.n_ctx.to_string(),
        "--seed".to_string(),
        config.seed.to_string(),
        "--n-gpu-layers".to_string(),
        config.n_gpu_layers.to_string(),
    ];
    if config.use_mlock {
        args.push("--mlock".to_string());
    }
    if !config.use_mmap {
        args.push("--no-mmap".to_string());
    }
    if role == ServerRole::Embedding {
        args.push("--embeddings".to_string());
        args.push("--pooling".to_string());
        args.push("mean".to_string());
    }
    if !config.enable_logging {
        args.push("--log-disable".to_string());
    }
    args
}

/// One running `llama-server` child. Killed when dropped.
pub struct LlamaServer {
    child: Child,
    role: ServerRole,
    base_url: String,
    client: Client,
}

impl LlamaServer {
    pub async fn spawn(
        binary: &Path,
        model_path: &Path,
        model: &ModelConfig,
        server: &ServerConfig,
        role: ServerRole,
    ) -> Result<Self> {
        if !model_path.is_file() {
            return Err(anyhow!("model file not found: {}", model_path.display()));
        }

        let port = find_free_port()?;
        let args = build_args(model_path, model, port, role);
        let (stderr, log_path) = if model.enable_logging {
            fs::create_dir_all(&server.log_dir).with_context(|| {
                format!("failed to create log directory {}", server.log_dir.display())
            })?;
            let log_path = server.log_dir.join(format!("llama-server-{role}.log"));
            let file = fs::File::create(&log_path)
                .with_context(|| format!("failed to create {}", log_path.display()))?;
            (Stdio::from(file), Some(log_path))
        } else {
            (Stdio::null(), None)
        };

        debug!(binary = %binary.display(), ?args, "spawning llama-server");
        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", binary.display()))?;

        let client = Client::new();
        let base_url = format!("http://127.0.0.1:{port}");
        let timer = Telemetry::new();
        wait_until_ready(&client, &base_url, &mut child, server.load_timeout)
            .await
            .with_context(|| match &log_path {
                Some(path) => format!(
                    "failed to load {} for {role}; see {}",
                    model_path.display(),
                    path.display()
                ),
                None => format!("failed to load {} for {role}", model_path.display()),
            })?;
        info!(
            %role,
            model = %model_path.display(),
            port,
            elapsed_ms = timer.elapsed_ms(),
            "model loaded"
        );

        Ok(Self {
            child,
            role,
            base_url,
            client,
        })
    }

    pub fn role(&self) -> ServerRole {
        self.role
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill().await?;
        }
        debug!(role = %self.role, "llama-server stopped");
        Ok(())
    }

    pub async fn completion(&self, prompt: &str, max_tokens: u32, seed: u32) -> Result<String> {
        let body = json!({
            "prompt": prompt,
            "n_predict": max_tokens,
            "seed": seed,
            "stream": false,
        });
        let payload = self.post("/completion", &body).await?;
        parse_completion_response(&payload)
    }

    pub async fn embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "input": inputs });
        let payload = self.post("/v1/embeddings", &body).await?;
        parse_embedding_response(&payload)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} server request to {endpoint} failed", self.role))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} server returned {status}: {text}", self.role));
        }
        Ok(response.json().await?)
    }
}

async fn wait_until_ready(
    client: &Client,
    base_url: &str,
    child: &mut Child,
    timeout: Duration,
) -> Result<()> {
    let url = format!("{base_url}/health");
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(anyhow!("llama-server exited early with {status}"));
        }
        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                if let Ok(payload) = response.json::<Value>().await {
                    if payload.get("status").and_then(|v| v.as_str()) == Some("ok") {
                        return Ok(());
                    }
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(anyhow!(
                "llama-server did not become ready within {}s",
                timeout.as_secs()
            ));
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

fn find_free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

pub fn parse_completion_response(payload: &Value) -> Result<String> {
    payload
        .get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("completion response missing content"))
}

/// Vectors from an OpenAI-style embeddings payload, in request order.
pub fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>> {
    let Some(data) = payload.get("data").and_then(|v| v.as_array()) else {
        return Err(anyhow!("embedding response missing data array"));
    };

    let mut indexed_embeddings = Vec::with_capacity(data.len());
    for (fallback_idx, item) in data.iter().enumerate() {
        let Some(values) = item.get("embedding").and_then(|v| v.as_array()) else {
            return Err(anyhow!("embedding response item missing embedding array"));
        };

        let mut embedding = Vec::with_capacity(values.len());
        for value in values {
            let Some(float_value) = value.as_f64() else {
                return Err(anyhow!("embedding contains non-numeric value"));
            };
            embedding.push(float_value as f32);
        }

        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_idx);
        indexed_embeddings.push((index, embedding));
    }

    indexed_embeddings.sort_by_key(|(idx, _)| *idx);
    Ok(indexed_embeddings
        .into_iter()
        .map(|(_, embedding)| embedding)
        .collect())
}

/// The loaded model: a generation instance and an embedding instance.
pub struct LlamaRuntime {
    generator: LlamaServer,
    embedder: LlamaServer,
    max_tokens: u32,
    seed: u32,
}

impl LlamaRuntime {
    pub async fn load(model: &ModelConfig, server: &ServerConfig) -> Result<Self> {
        let binary = resolve_server_binary(server.binary.as_deref())?;
        info!(model = %model.model_path.display(), n_ctx = model.n_ctx, "loading model");

        let generator =
            LlamaServer::spawn(&binary, &model.model_path, model, server, ServerRole::Generation)
                .await?;

        let embedding_path = match (&model.embedding_model_path, model.embedding) {
            (Some(path), _) => path.clone(),
            (None, true) => model.model_path.clone(),
            (None, false) => {
                return Err(anyhow!(
                    "embedding mode is off and no embedding model path is configured"
                ))
            }
        };
        let embedder =
            LlamaServer::spawn(&binary, &embedding_path, model, server, ServerRole::Embedding)
                .await?;

        Ok(Self {
            generator,
            embedder,
            max_tokens: model.max_tokens,
            seed: model.seed,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        self.generator.shutdown().await?;
        self.embedder.shutdown().await
    }
}

impl EmbeddingModel for LlamaRuntime {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder.embeddings(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embeddings(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding server returned no vector"))
    }
}

impl CompletionModel for LlamaRuntime {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generator
            .completion(prompt, self.max_tokens, self.seed)
            .await
    }
}
