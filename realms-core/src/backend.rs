//! Gemini-backed implementations of the provider traits.
//!
//! Every call reads the shared [`KeySlot`] first, so a key chosen through the
//! selection flow takes effect on the next request without rebuilding
//! anything.

use crate::credential::KeySlot;
use crate::prompt;
use crate::provider::{
    ChatProvider, ImageProvider, ImageRequest, NarrativeProvider, NarrativeRequest, ProviderError,
};
use crate::state::{EncodedImage, HistoryItem, HistoryRole};
use async_trait::async_trait;
use gemini::{Content, Gemini, ImageConfig, Part, Request, Role};
use tracing::debug;

pub const DEFAULT_STORY_MODEL: &str = "gemini-flash-lite-latest";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_STORY_TEMPERATURE: f32 = 0.7;

/// A client bound to the current key, or `MissingKey`.
fn client_for(base: &Gemini, keys: &KeySlot) -> Result<Gemini, ProviderError> {
    let key = keys.get().ok_or(ProviderError::MissingKey)?;
    Ok(base.clone().with_api_key(key))
}

fn to_content(item: &HistoryItem) -> Content {
    Content {
        role: match item.role {
            HistoryRole::User => Role::User,
            HistoryRole::Model => Role::Model,
        },
        parts: item
            .parts
            .iter()
            .map(|p| Part::Text {
                text: p.text.clone(),
            })
            .collect(),
    }
}

/// Story generation with a JSON response schema.
pub struct GeminiNarrator {
    client: Gemini,
    keys: KeySlot,
    temperature: f32,
}

impl GeminiNarrator {
    pub fn new(keys: KeySlot) -> Self {
        Self {
            client: Gemini::new("").with_model(DEFAULT_STORY_MODEL),
            keys,
            temperature: DEFAULT_STORY_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client = self.client.with_model(model);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(base_url);
        self
    }

    /// The `generateContent` request for a narrative turn.
    pub fn build_request(&self, request: &NarrativeRequest) -> Request {
        Request::new(request.contents.iter().map(to_content).collect())
            .with_system(request.system_instruction.clone())
            .with_temperature(self.temperature)
            .with_json_schema(request.response_schema.clone())
    }
}

#[async_trait]
impl NarrativeProvider for GeminiNarrator {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, ProviderError> {
        let client = client_for(&self.client, &self.keys)?;
        debug!(model = client.model(), turns = request.contents.len(), "requesting story");

        let response = client.generate(self.build_request(request)).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Scene illustration.
pub struct GeminiIllustrator {
    client: Gemini,
    keys: KeySlot,
}

impl GeminiIllustrator {
    pub fn new(keys: KeySlot) -> Self {
        Self {
            client: Gemini::new("").with_model(DEFAULT_IMAGE_MODEL),
            keys,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client = self.client.with_model(model);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(base_url);
        self
    }

    pub fn build_request(&self, request: &ImageRequest) -> Request {
        Request::new(vec![Content::user(request.prompt.clone())]).with_image_config(ImageConfig {
            aspect_ratio: Some(request.aspect_ratio.to_string()),
            image_size: Some(request.size.as_str().to_string()),
        })
    }
}

#[async_trait]
impl ImageProvider for GeminiIllustrator {
    async fn generate(&self, request: &ImageRequest) -> Result<Option<EncodedImage>, ProviderError> {
        let client = client_for(&self.client, &self.keys)?;
        debug!(model = client.model(), size = %request.size, "requesting illustration");

        let response = client.generate(self.build_request(request)).await?;
        Ok(response
            .first_inline_data()
            .map(|(mime_type, data)| EncodedImage::new(mime_type, data)))
    }
}

/// Companion answers.
pub struct GeminiCompanion {
    client: Gemini,
    keys: KeySlot,
}

impl GeminiCompanion {
    pub fn new(keys: KeySlot) -> Self {
        Self {
            client: Gemini::new("").with_model(DEFAULT_CHAT_MODEL),
            keys,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client = self.client.with_model(model);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(base_url);
        self
    }

    pub fn build_request(&self, message: &str, context_summary: &str) -> Request {
        Request::new(vec![Content::user(message)])
            .with_system(prompt::companion_system_prompt(context_summary))
    }
}

#[async_trait]
impl ChatProvider for GeminiCompanion {
    async fn ask(&self, message: &str, context_summary: &str) -> Result<String, ProviderError> {
        let client = client_for(&self.client, &self.keys)?;
        let response = client
            .generate(self.build_request(message, context_summary))
            .await?;
        Ok(response.text())
    }
}
