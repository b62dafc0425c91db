//! Collaborator interfaces for the generation backends.
//!
//! The engine only sees these traits, so the Gemini-backed implementations
//! in [`crate::backend`] and the fakes in [`crate::testing`] are
//! interchangeable.

use crate::state::{EncodedImage, HistoryItem, ImageSize};
use async_trait::async_trait;
use thiserror::Error;

/// Aspect ratio of every scene illustration.
pub const SCENE_ASPECT_RATIO: &str = "16:9";

/// Errors reported by a generation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no API key selected")]
    MissingKey,

    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<gemini::Error> for ProviderError {
    fn from(err: gemini::Error) -> Self {
        match err {
            gemini::Error::NoApiKey => ProviderError::MissingKey,
            gemini::Error::Api { status, message } => ProviderError::Api { status, message },
            gemini::Error::Network(msg) => ProviderError::Network(msg),
            gemini::Error::Parse(msg) | gemini::Error::Config(msg) => {
                ProviderError::InvalidResponse(msg)
            }
        }
    }
}

/// A request for the next story segment.
#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    /// System instructions embedding the current game state.
    pub system_instruction: String,
    /// Recent history followed by this turn's player content.
    pub contents: Vec<HistoryItem>,
    /// Schema the response must conform to.
    pub response_schema: serde_json::Value,
}

impl NarrativeRequest {
    /// Text of the final (current) user turn.
    pub fn turn_content(&self) -> String {
        self.contents.last().map(HistoryItem::text).unwrap_or_default()
    }
}

/// A request for a scene illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub aspect_ratio: &'static str,
}

impl ImageRequest {
    pub fn scene(prompt: impl Into<String>, size: ImageSize) -> Self {
        Self {
            prompt: prompt.into(),
            size,
            aspect_ratio: SCENE_ASPECT_RATIO,
        }
    }
}

/// Generates structured story continuations.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    /// Return the raw (JSON) payload for the next turn.
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, ProviderError>;
}

/// Generates scene illustrations.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Return the generated image, or `None` if the model produced no image part.
    async fn generate(&self, request: &ImageRequest) -> Result<Option<EncodedImage>, ProviderError>;
}

/// Answers the player's side questions.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Answer `message` given a one-line summary of the world. Stateless.
    async fn ask(&self, message: &str, context_summary: &str) -> Result<String, ProviderError>;
}
