pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod media;
pub mod prompt;
pub mod state;

// Re-export main types for convenience
pub use ai::{GeminiClient, InferenceClient, EMPTY_RESPONSE_FALLBACK};
pub use config::{Config, Settings};
pub use controller::{ReplyController, SendOutcome, REQUEST_ABANDONED_MESSAGE};
pub use error::{InferenceError, ResolutionError, NO_IMAGE_MESSAGE};
pub use media::{
    ContentResolver, DecodeStrategy, DecodedImage, FsContentResolver, HostCapabilities,
    ImageHandle, MediaResolver,
};
pub use prompt::{GeneratedPrompt, PromptPart, FIXED_INSTRUCTION};
pub use state::{ApiState, StateStore};
