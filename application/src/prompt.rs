use anyhow::Context;
use domain::error::RagError;
use shared::types::Result;
use std::path::Path;

pub const DEFAULT_QA_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:";

const INPUT_VARIABLES: [&str; 2] = ["context", "question"];

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A QA prompt with `{context}` and `{question}` slots. `{{` and `}}` are
/// literal braces.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self> {
        let segments = parse(template)?;
        for required in INPUT_VARIABLES {
            let present = segments
                .iter()
                .any(|s| matches!(s, Segment::Variable(name) if name == required));
            if !present {
                return Err(invalid(format!("missing {{{required}}} placeholder")));
            }
        }
        Ok(Self { segments })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {}", path.display()))?;
        Self::new(&template).with_context(|| format!("in prompt template {}", path.display()))
    }

    /// How many times the context is repeated in a formatted prompt.
    pub fn context_slots(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Variable(name) if name == "context"))
            .count()
    }

    pub fn format(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) if name == "context" => out.push_str(context),
                Segment::Variable(_) => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: parse(DEFAULT_QA_TEMPLATE).unwrap_or_default(),
        }
    }
}

fn invalid(msg: String) -> anyhow::Error {
    RagError::InvalidTemplate(msg).into()
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(invalid("unclosed '{'".to_string())),
                    }
                }
                let name = name.trim().to_string();
                if !INPUT_VARIABLES.contains(&name.as_str()) {
                    return Err(invalid(format!("unknown placeholder {{{name}}}")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name));
            }
            '}' => return Err(invalid("unmatched '}'".to_string())),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
