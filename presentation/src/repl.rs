use colored::Colorize;
use domain::language_model::QuestionAnswering;
use domain::models::Answer;
use shared::types::Result;
use shared::utils::preview;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

pub const PROMPT: &str = "Write a question:";

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoopStats {
    pub answered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Reads questions line by line and writes answers to `out`, errors to `err`.
pub struct Repl<W, E> {
    out: W,
    err: E,
    format: OutputFormat,
}

impl<W: Write, E: Write> Repl<W, E> {
    pub fn new(out: W, err: E, format: OutputFormat) -> Self {
        Self { out, err, format }
    }

    pub async fn run<R, H>(&mut self, input: R, handler: &H) -> Result<LoopStats>
    where
        R: AsyncBufRead + Unpin,
        H: QuestionAnswering,
    {
        let mut stats = LoopStats::default();
        let mut input = input;
        let mut buf = Vec::new();

        writeln!(self.out, "{PROMPT}")?;
        self.out.flush()?;

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!(bytes = buf.len(), "input line is not valid UTF-8");
                writeln!(self.err, "{}", "Skipped an input line that is not valid UTF-8.".yellow())?;
                self.err.flush()?;
                stats.skipped += 1;
                continue;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question.to_ascii_lowercase().as_str(), "exit" | "quit") {
                debug!("exit requested");
                break;
            }

            if self.ask(question, handler).await? {
                stats.answered += 1;
            } else {
                stats.failed += 1;
            }
        }

        debug!(
            answered = stats.answered,
            failed = stats.failed,
            skipped = stats.skipped,
            "loop finished"
        );
        Ok(stats)
    }

    /// Answer one question. `Ok(false)` means the handler failed and the
    /// failure was reported; only write errors propagate.
    pub async fn ask<H: QuestionAnswering>(&mut self, question: &str, handler: &H) -> Result<bool> {
        match handler.answer(question).await {
            Ok(answer) => {
                let rendered = render_answer(&answer, self.format)?;
                writeln!(self.out, "{rendered}")?;
                self.out.flush()?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "question failed");
                writeln!(self.err, "{}", format!("Error: {e:#}").red())?;
                self.err.flush()?;
                Ok(false)
            }
        }
    }
}

pub fn render_answer(answer: &Answer, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(answer)?),
        OutputFormat::Human => {
            let mut rendered = answer.text.clone();
            if !answer.sources.is_empty() {
                rendered.push_str(&format!("\n\n{}", "Sources:".green()));
                for (i, source) in answer.sources.iter().enumerate() {
                    rendered.push_str(&format!(
                        "\n  {} {} ({:.3}) {}",
                        format!("[{}]", i + 1).blue(),
                        source.chunk.location(),
                        source.score,
                        preview(&source.chunk.text, PREVIEW_CHARS).dimmed()
                    ));
                }
            }
            Ok(rendered)
        }
    }
}
