pub mod error;
pub mod gemini;
pub mod prompt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

/// A web source the model grounded its answer on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// Free-text model output. No schema is imposed on `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commentary {
    pub text: String,
    pub sources: Vec<Citation>,
}

#[async_trait::async_trait]
pub trait CommentaryClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, prompt: &str) -> anyhow::Result<Commentary>;
}
