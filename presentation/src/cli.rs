use crate::repl::{OutputFormat, Repl};
use anyhow::Context;
use application::prompt::PromptTemplate;
use application::rag_service::{context_budget_chars, RagService};
use clap::Parser;
use infrastructure::backend::ModelBackend;
use infrastructure::config::{Backend, Config};
use shared::telemetry::init_logging;
use shared::types::Result;
use std::io;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "llama-rag")]
#[command(about = "Answer questions about a folder of documents with a local Llama model")]
pub struct Cli {
    /// Inference backend: llama or ollama
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Path to the GGUF weight file
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Separate GGUF file used for embeddings
    #[arg(long)]
    pub embedding_model: Option<PathBuf>,

    /// Directory of documents to index
    #[arg(long)]
    pub docs: Option<PathBuf>,

    /// Context window in tokens
    #[arg(long)]
    pub ctx_size: Option<u32>,

    #[arg(long)]
    pub seed: Option<u32>,

    /// Lock model weights in memory
    #[arg(long)]
    pub mlock: bool,

    /// Read the weight file instead of memory-mapping it
    #[arg(long)]
    pub no_mmap: bool,

    /// Layers to offload to the GPU
    #[arg(long, allow_hyphen_values = true)]
    pub gpu_layers: Option<i32>,

    /// Maximum tokens generated per answer
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Path to the llama-server binary
    #[arg(long)]
    pub server_bin: Option<PathBuf>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Number of chunks retrieved per question
    #[arg(long)]
    pub top_k: Option<usize>,

    /// File holding a prompt with {context} and {question}
    #[arg(long)]
    pub prompt_template: Option<PathBuf>,

    /// Print answers as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Ask this question and exit instead of reading stdin
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Flags win over environment and defaults.
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(model) = &self.model {
            config.model.model_path = model.clone();
        }
        if let Some(path) = &self.embedding_model {
            config.model.embedding_model_path = Some(path.clone());
        }
        if let Some(docs) = &self.docs {
            config.docs_dir = docs.clone();
        }
        if let Some(n_ctx) = self.ctx_size {
            config.model.n_ctx = n_ctx;
        }
        if let Some(seed) = self.seed {
            config.model.seed = seed;
        }
        if self.mlock {
            config.model.use_mlock = true;
        }
        if self.no_mmap {
            config.model.use_mmap = false;
        }
        if let Some(layers) = self.gpu_layers {
            config.model.n_gpu_layers = layers;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.model.max_tokens = max_tokens;
        }
        if let Some(bin) = &self.server_bin {
            config.server.binary = Some(bin.clone());
        }
        if let Some(size) = self.chunk_size {
            config.retrieval.chunk_size = size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.retrieval.chunk_overlap = overlap;
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(path) = &self.prompt_template {
            config.prompt_template = Some(path.clone());
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    fn question(&self) -> Option<String> {
        let joined = self.args.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

pub struct CliApp {
    config: Config,
    format: OutputFormat,
    question: Option<String>,
}

impl CliApp {
    /// Resolve configuration and install logging. Nothing is loaded yet.
    pub fn new(cli: &Cli) -> Result<Self> {
        init_logging(cli.verbose);
        let mut config = Config::load()?;
        cli.apply(&mut config);
        config.validate()?;
        Ok(Self {
            config,
            format: cli.output_format(),
            question: cli.question(),
        })
    }

    pub async fn run(self) -> Result<()> {
        let prompt = match &self.config.prompt_template {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };

        let backend = ModelBackend::load(&self.config)
            .await
            .context("failed to load the model")?;
        info!(backend = backend.name(), "model ready");

        let (service, _stats) =
            RagService::build(backend, &self.config.docs_dir, &self.config.retrieval, prompt)
                .await?;
        let service = service.with_prompt_budget(context_budget_chars(&self.config.model));

        let result = self.serve(&service).await;

        if let Err(e) = service.into_model().shutdown().await {
            warn!(error = %e, "failed to stop model server");
        }
        result
    }

    async fn serve(&self, service: &RagService<ModelBackend>) -> Result<()> {
        let mut repl = Repl::new(io::stdout(), io::stderr(), self.format);
        match &self.question {
            Some(question) => {
                if !repl.ask(question, service).await? {
                    anyhow::bail!("failed to answer the question");
                }
            }
            None => {
                let stdin = BufReader::new(tokio::io::stdin());
                repl.run(stdin, service).await?;
            }
        }
        Ok(())
    }
}
