//! Narrative turn engine for an endless, illustrated text adventure.
//!
//! This crate provides:
//! - A turn state machine driving a generative narrator
//! - Strict validation of the narrator's structured output
//! - Inventory reconciliation from add/remove deltas
//! - Credential-gated scene illustration with stash-and-resume
//! - Single-slot save/load of the whole game state
//! - A companion chat that answers questions about the world
//!
//! # Quick Start
//!
//! ```ignore
//! use realms_core::{GameSession, KeySlot, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keys = KeySlot::from_env();
//!     let session = GameSession::new(SessionConfig::new(), keys.clone(), Arc::new(keys));
//!
//!     session.start().await;
//!     println!("{}", session.state().current_text);
//!
//!     session.choose("Follow the lantern light").await;
//!     session.save().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chat;
pub mod credential;
pub mod engine;
pub mod image;
pub mod inventory;
pub mod persist;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod session;
pub mod state;
pub mod testing;

// Re-export for convenience
pub use realms_macros::ResponseSchema;

// Primary public API
pub use chat::{ChatMessage, ChatRole, Companion};
pub use credential::{CredentialGate, CredentialStore, KeySlot};
pub use engine::{EngineConfig, TurnEngine, TurnError, TurnOutcome, TurnPhase};
pub use image::{DeferReason, ImageOrchestrator, ImageOutcome, PendingImage};
pub use persist::{FileStorage, MemoryStorage, PersistError, Storage, StorageError};
pub use provider::{ChatProvider, ImageProvider, NarrativeProvider, ProviderError};
pub use schema::{Choice, InventoryDelta, SchemaError, TurnResult};
pub use session::{GameSession, SessionConfig};
pub use state::{EncodedImage, GameState, ImageSize};
pub use testing::{RecordingIllustrator, ScriptedNarrator, TestHarness, ToggleCredentials, TurnScript};
