//! Error taxonomy for the reply flow.
//!
//! Every variant is recoverable. The controller turns each one into an
//! `ApiState::Error` carrying the `Display` text, so these strings are shown
//! to the user as-is.

use thiserror::Error;

pub const NO_IMAGE_MESSAGE: &str = "Please select a screenshot to proceed.";

/// Failures while turning an image handle into pixels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Please select a screenshot to proceed.")]
    NoImageSelected,
    #[error("Failed to load image from URI: {0}")]
    DecodeFailed(String),
}

/// Failures while talking to the generative model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("Gemini API error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("prompt was blocked: {0}")]
    Blocked(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InferenceError::Malformed(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

impl InferenceError {
    /// Message shown in the Error state
    pub fn user_message(&self) -> String {
        format!("API call failed: {}", self)
    }
}
