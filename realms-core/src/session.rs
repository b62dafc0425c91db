//! GameSession - the primary public API for playing.
//!
//! Wires the Gemini backends, the credential gate, the turn engine, the
//! companion and on-disk saves into one handle for front ends.

use crate::backend::{
    GeminiCompanion, GeminiIllustrator, GeminiNarrator, DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL,
    DEFAULT_STORY_MODEL, DEFAULT_STORY_TEMPERATURE,
};
use crate::chat::Companion;
use crate::credential::{CredentialGate, CredentialStore, KeySlot};
use crate::engine::{EngineConfig, TurnEngine, TurnOutcome};
use crate::image::{ImageOrchestrator, ImageOutcome};
use crate::persist::{self, FileStorage, PersistError};
use crate::state::{GameState, ImageSize};
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for creating a new game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub story_model: String,
    pub image_model: String,
    pub chat_model: String,

    /// Temperature for story generation.
    pub temperature: f32,

    /// History items sent with each story request.
    pub history_window: usize,

    /// Starting illustration tier.
    pub image_size: ImageSize,

    /// Directory holding the save file.
    pub save_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            story_model: DEFAULT_STORY_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_STORY_TEMPERATURE,
            history_window: EngineConfig::default().history_window,
            image_size: ImageSize::default(),
            save_dir: PathBuf::from("saves"),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_story_model(mut self, model: impl Into<String>) -> Self {
        self.story_model = model.into();
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_history_window(mut self, items: usize) -> Self {
        self.history_window = items;
        self
    }

    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }
}

/// A game session.
///
/// This is the main entry point for gameplay. It manages:
/// - The turn engine and its game state
/// - The companion chat
/// - Save and load
pub struct GameSession {
    engine: TurnEngine,
    companion: Companion,
    storage: FileStorage,
    keys: KeySlot,
}

impl GameSession {
    /// Create a session backed by Gemini.
    ///
    /// `keys` is read by every backend call; `credentials` gates illustration.
    pub fn new(config: SessionConfig, keys: KeySlot, credentials: Arc<dyn CredentialStore>) -> Self {
        let narrator = GeminiNarrator::new(keys.clone())
            .with_model(config.story_model.clone())
            .with_temperature(config.temperature);
        let illustrator = GeminiIllustrator::new(keys.clone()).with_model(config.image_model.clone());
        let chat = GeminiCompanion::new(keys.clone()).with_model(config.chat_model.clone());

        let images = ImageOrchestrator::new(CredentialGate::new(credentials), Arc::new(illustrator));
        let engine_config = EngineConfig::default()
            .with_history_window(config.history_window)
            .with_image_size(config.image_size);

        Self {
            engine: TurnEngine::new(Arc::new(narrator), images, engine_config),
            companion: Companion::new(Arc::new(chat)),
            storage: FileStorage::new(config.save_dir),
            keys,
        }
    }

    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }

    pub fn companion(&self) -> &Companion {
        &self.companion
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn keys(&self) -> &KeySlot {
        &self.keys
    }

    pub fn state(&self) -> GameState {
        self.engine.snapshot()
    }

    /// Generate the opening scene.
    pub async fn start(&self) -> TurnOutcome {
        self.engine.submit_choice("").await
    }

    pub async fn choose(&self, choice: &str) -> TurnOutcome {
        self.engine.submit_choice(choice).await
    }

    pub fn set_image_size(&self, size: ImageSize) {
        self.engine.set_image_size(size);
    }

    /// Run key selection, then retry any illustration that was waiting on it.
    pub async fn select_key(&self) -> Option<ImageOutcome> {
        self.engine.select_credential_and_resume().await
    }

    pub async fn ask(&self, message: &str) -> Option<String> {
        self.companion
            .ask(message, &self.engine.context_summary())
            .await
    }

    pub async fn save(&self) -> Result<GameState, PersistError> {
        self.engine.save(&self.storage).await
    }

    pub async fn load(&self) -> Result<bool, PersistError> {
        self.engine.load(&self.storage).await
    }

    pub async fn has_save(&self) -> Result<bool, PersistError> {
        persist::has_save(&self.storage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TurnPhase, FALLBACK_STORY_TEXT};

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .with_story_model("story-x")
            .with_image_size(ImageSize::Size2K)
            .with_history_window(6)
            .with_save_dir("/tmp/realms");

        assert_eq!(config.story_model, "story-x");
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.image_size, ImageSize::Size2K);
        assert_eq!(config.history_window, 6);
        assert_eq!(config.save_dir, PathBuf::from("/tmp/realms"));
    }

    #[tokio::test]
    async fn test_session_without_key_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeySlot::new();
        let session = GameSession::new(
            SessionConfig::new().with_save_dir(dir.path()),
            keys.clone(),
            Arc::new(keys),
        );

        assert!(matches!(session.start().await, TurnOutcome::Failed(_)));
        assert_eq!(session.state().current_text, FALLBACK_STORY_TEXT);
        assert_eq!(session.engine().phase(), TurnPhase::TurnComplete);
        assert!(!session.has_save().await.unwrap());
    }
}
