//! Answer generation
//!
//! A generator turns retrieved context plus the user's question into a
//! grounded answer with a single completion request.

use async_trait::async_trait;

use crate::Result;

/// Instruction sent as the system message of every completion.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context from documents. If the context doesn't contain relevant information, say so politely.";

/// Substituted when the model returns an empty completion.
pub const NO_ANSWER: &str = "No answer generated";

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `question` using only `context`.
    async fn generate(&self, context: &str, question: &str) -> Result<String>;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

/// User message embedding both the context and the question.
pub fn build_user_prompt(context: &str, question: &str) -> String {
    format!(
        "Context from the document:\n{context}\n\nQuestion: {question}\n\nAnswer based on the context above:"
    )
}

/// Replace a missing or blank completion with [`NO_ANSWER`].
pub fn answer_or_placeholder(completion: Option<String>) -> String {
    match completion {
        Some(text) if !text.trim().is_empty() => text,
        _ => NO_ANSWER.to_string(),
    }
}

mod groq;

pub use groq::*;
