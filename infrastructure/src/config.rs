use anyhow::anyhow;
use domain::error::RagError;
use dotenvy::dotenv;
use shared::types::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Spawn `llama-server` against a local weight file.
    Llama,
    /// Talk to an already running Ollama daemon.
    Ollama,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llama" | "llama.cpp" | "llama-cpp" => Ok(Backend::Llama),
            "ollama" => Ok(Backend::Ollama),
            other => Err(anyhow!("unknown backend '{other}' (expected 'llama' or 'ollama')")),
        }
    }
}

/// Settings used to load the weight file. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub embedding_model_path: Option<PathBuf>,
    pub n_ctx: u32,
    pub seed: u32,
    pub use_mlock: bool,
    pub use_mmap: bool,
    pub n_gpu_layers: i32,
    pub embedding: bool,
    pub enable_logging: bool,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/llama-2-7b-chat.Q5_0.gguf"),
            embedding_model_path: None,
            n_ctx: 1024,
            seed: 0,
            use_mlock: false,
            use_mmap: true,
            n_gpu_layers: 0,
            embedding: true,
            enable_logging: true,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub binary: Option<PathBuf>,
    pub load_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            load_timeout: Duration::from_secs(120),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            embed_batch_size: 1,
            embed_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub docs_dir: PathBuf,
    pub prompt_template: Option<PathBuf>,
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Llama,
            docs_dir: PathBuf::from("./docs"),
            prompt_template: None,
            model: ModelConfig::default(),
            server: ServerConfig::default(),
            ollama: OllamaConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, overridden by the process environment (and `.env`).
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = EnvReader { lookup: &lookup };
        let defaults = Config::default();

        let model = ModelConfig {
            model_path: env.path("LLAMA_RAG_MODEL_PATH")?.unwrap_or(defaults.model.model_path),
            embedding_model_path: env.path("LLAMA_RAG_EMBEDDING_MODEL_PATH")?,
            n_ctx: env.parsed("LLAMA_RAG_N_CTX")?.unwrap_or(defaults.model.n_ctx),
            seed: env.parsed("LLAMA_RAG_SEED")?.unwrap_or(defaults.model.seed),
            use_mlock: env.flag("LLAMA_RAG_USE_MLOCK")?.unwrap_or(defaults.model.use_mlock),
            use_mmap: env.flag("LLAMA_RAG_USE_MMAP")?.unwrap_or(defaults.model.use_mmap),
            n_gpu_layers: env
                .parsed("LLAMA_RAG_N_GPU_LAYERS")?
                .unwrap_or(defaults.model.n_gpu_layers),
            embedding: env.flag("LLAMA_RAG_EMBEDDING")?.unwrap_or(defaults.model.embedding),
            enable_logging: env
                .flag("LLAMA_RAG_ENABLE_LOGGING")?
                .unwrap_or(defaults.model.enable_logging),
            max_tokens: env
                .parsed("LLAMA_RAG_MAX_TOKENS")?
                .unwrap_or(defaults.model.max_tokens),
        };

        let server = ServerConfig {
            binary: env.path("LLAMA_SERVER_PATH")?,
            load_timeout: env
                .parsed::<u64>("LLAMA_RAG_LOAD_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.server.load_timeout),
            log_dir: env.path("LLAMA_RAG_LOG_DIR")?.unwrap_or(defaults.server.log_dir),
        };

        let ollama = OllamaConfig {
            base_url: env
                .string("OLLAMA_BASE_URL")
                .unwrap_or(defaults.ollama.base_url),
            model: env.string("OLLAMA_MODEL").unwrap_or(defaults.ollama.model),
        };

        let retrieval = RetrievalConfig {
            chunk_size: env
                .parsed("LLAMA_RAG_CHUNK_SIZE")?
                .unwrap_or(defaults.retrieval.chunk_size),
            chunk_overlap: env
                .parsed("LLAMA_RAG_CHUNK_OVERLAP")?
                .unwrap_or(defaults.retrieval.chunk_overlap),
            top_k: env.parsed("LLAMA_RAG_TOP_K")?.unwrap_or(defaults.retrieval.top_k),
            embed_batch_size: env
                .parsed("LLAMA_RAG_EMBED_BATCH_SIZE")?
                .unwrap_or(defaults.retrieval.embed_batch_size),
            embed_concurrency: env
                .parsed("LLAMA_RAG_EMBED_CONCURRENCY")?
                .unwrap_or(defaults.retrieval.embed_concurrency),
        };

        Ok(Self {
            backend: env.parsed("LLAMA_RAG_BACKEND")?.unwrap_or(defaults.backend),
            docs_dir: env.path("LLAMA_RAG_DOCS_DIR")?.unwrap_or(defaults.docs_dir),
            prompt_template: env.path("LLAMA_RAG_PROMPT_TEMPLATE")?,
            model,
            server,
            ollama,
            retrieval,
        })
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> anyhow::Error { RagError::InvalidConfig(msg.to_string()).into() };

        if self.model.n_ctx == 0 {
            return Err(invalid("context size must be greater than zero"));
        }
        if self.model.max_tokens == 0 {
            return Err(invalid("max tokens must be greater than zero"));
        }
        if self.model.max_tokens >= self.model.n_ctx {
            return Err(invalid("max tokens must be smaller than the context size"));
        }
        if self.retrieval.chunk_size == 0 {
            return Err(invalid("chunk size must be greater than zero"));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(invalid("chunk overlap must be smaller than chunk size"));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("top k must be at least 1"));
        }
        if self.retrieval.embed_batch_size == 0 || self.retrieval.embed_concurrency == 0 {
            return Err(invalid("embedding batch size and concurrency must be at least 1"));
        }
        if self.backend == Backend::Llama
            && !self.model.embedding
            && self.model.embedding_model_path.is_none()
        {
            return Err(invalid(
                "embedding mode is off and no embedding model path is configured",
            ));
        }
        Ok(())
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn path(&self, key: &str) -> Result<Option<PathBuf>> {
        Ok(self.string(key).map(PathBuf::from))
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow!("invalid value '{raw}' for {key}: {e}")),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(anyhow!("invalid value '{raw}' for {key}: expected true or false")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend, Backend::Llama);
        assert_eq!(config.model.n_ctx, 1024);
        assert_eq!(config.model.seed, 0);
        assert!(!config.model.use_mlock);
        assert!(config.model.use_mmap);
        assert_eq!(config.model.n_gpu_layers, 0);
        assert!(config.model.embedding);
        assert!(config.model.enable_logging);
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("LLAMA_RAG_BACKEND", "ollama"),
            ("LLAMA_RAG_N_CTX", "4096"),
            ("LLAMA_RAG_USE_MLOCK", "yes"),
            ("LLAMA_RAG_USE_MMAP", "0"),
            ("LLAMA_RAG_N_GPU_LAYERS", "-1"),
            ("LLAMA_RAG_DOCS_DIR", "/srv/docs"),
            ("LLAMA_RAG_LOAD_TIMEOUT_SECS", "5"),
            ("OLLAMA_MODEL", "mistral"),
        ])
        .unwrap();
        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.model.n_ctx, 4096);
        assert!(config.model.use_mlock);
        assert!(!config.model.use_mmap);
        assert_eq!(config.model.n_gpu_layers, -1);
        assert_eq!(config.docs_dir, PathBuf::from("/srv/docs"));
        assert_eq!(config.server.load_timeout, Duration::from_secs(5));
        assert_eq!(config.ollama.model, "mistral");
    }

    #[test]
    fn test_malformed_value_names_the_variable() {
        let err = config_from(&[("LLAMA_RAG_N_CTX", "abc")]).unwrap_err();
        assert!(err.to_string().contains("LLAMA_RAG_N_CTX"));

        let err = config_from(&[("LLAMA_RAG_USE_MMAP", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("LLAMA_RAG_USE_MMAP"));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let config = config_from(&[
            ("LLAMA_RAG_CHUNK_SIZE", "100"),
            ("LLAMA_RAG_CHUNK_OVERLAP", "100"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_leaves_room_for_the_prompt() {
        let config = config_from(&[("LLAMA_RAG_N_CTX", "512"), ("LLAMA_RAG_MAX_TOKENS", "512")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[("LLAMA_RAG_N_CTX", "2048"), ("LLAMA_RAG_MAX_TOKENS", "512")]).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_embedding_source() {
        let mut config = config_from(&[("LLAMA_RAG_EMBEDDING", "false")]).unwrap();
        assert!(config.validate().is_err());

        config.model.embedding_model_path = Some(PathBuf::from("models/embed.gguf"));
        assert!(config.validate().is_ok());
    }
}
