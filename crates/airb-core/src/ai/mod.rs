pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::error::InferenceError;
use crate::prompt::GeneratedPrompt;

/// Text returned when the model answers without any text payload
pub const EMPTY_RESPONSE_FALLBACK: &str = "No response from AI.";

/// A remote model that turns a multi-part prompt into text.
///
/// One call is one network round trip. Implementations never retry.
#[async_trait]
pub trait InferenceClient: Send + Sync + 'static {
    async fn generate(&self, prompt: &GeneratedPrompt) -> Result<String, InferenceError>;
}
