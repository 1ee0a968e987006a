use serde::{Deserialize, Serialize};

/// One ingested file's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Path relative to the documents root, `/`-separated.
    pub id: String,
    pub source: String,
    pub text: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source: String,
    pub index: usize,
    pub text: String,
    pub line_from: usize,
    pub line_to: usize,
}

impl Chunk {
    /// `source:from-to`, used when citing.
    pub fn location(&self) -> String {
        if self.line_from == self.line_to {
            format!("{}:{}", self.source, self.line_from)
        } else {
            format!("{}:{}-{}", self.source, self.line_from, self.line_to)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

impl Answer {
    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.chunk.id.as_str()).collect()
    }
}
