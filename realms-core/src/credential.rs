//! Credential gating for the image provider.
//!
//! The image model needs a key the player has explicitly selected. How that
//! selection happens is up to the front end; the core only asks two
//! questions through [`CredentialStore`].

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

/// The external credential-selection collaborator.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether a usable key is currently selected.
    async fn has_selected_key(&self) -> bool;

    /// Run the selection flow. Completes when the flow reports done, which
    /// does not guarantee a valid key was chosen.
    async fn open_selection(&self);
}

/// Decides whether an image request may go ahead.
#[derive(Clone, Default)]
pub struct CredentialGate {
    store: Option<Arc<dyn CredentialStore>>,
}

impl CredentialGate {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A gate for deployments without a selection flow. Always open.
    pub fn ungated() -> Self {
        Self { store: None }
    }

    pub fn is_gated(&self) -> bool {
        self.store.is_some()
    }

    pub async fn has_credential(&self) -> bool {
        match &self.store {
            Some(store) => store.has_selected_key().await,
            None => true,
        }
    }

    pub async fn request_selection(&self) {
        if let Some(store) = &self.store {
            store.open_selection().await;
        }
    }
}

/// A shared, swappable API key.
///
/// Backends read the slot right before each request, so a key selected
/// mid-game is picked up by the very next call.
#[derive(Clone, Default)]
pub struct KeySlot {
    key: Arc<RwLock<Option<String>>>,
}

impl KeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        let slot = Self::new();
        slot.set(key);
        slot
    }

    /// Seed from `GEMINI_API_KEY` (or `API_KEY`); empty if neither is set.
    pub fn from_env() -> Self {
        let slot = Self::new();
        if let Ok(key) = std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            slot.set(key);
        }
        slot
    }

    /// Replace the key. Blank keys clear the slot.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        let key = key.trim();
        let mut guard = self.key.write().unwrap_or_else(PoisonError::into_inner);
        *guard = (!key.is_empty()).then(|| key.to_string());
    }

    pub fn clear(&self) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl CredentialStore for KeySlot {
    async fn has_selected_key(&self) -> bool {
        self.is_set()
    }

    /// Nothing to prompt with; whatever is in the slot stands.
    async fn open_selection(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ungated_defaults_to_authorized() {
        let gate = CredentialGate::ungated();
        assert!(!gate.is_gated());
        assert!(gate.has_credential().await);
        gate.request_selection().await;
    }

    #[tokio::test]
    async fn test_gate_follows_key_slot() {
        let slot = KeySlot::new();
        let gate = CredentialGate::new(Arc::new(slot.clone()));
        assert!(gate.is_gated());
        assert!(!gate.has_credential().await);

        slot.set("abc123");
        assert!(gate.has_credential().await);

        slot.clear();
        assert!(!gate.has_credential().await);
    }

    #[test]
    fn test_key_slot_trims_and_rejects_blank() {
        let slot = KeySlot::with_key("  key-1 \n");
        assert_eq!(slot.get().as_deref(), Some("key-1"));

        slot.set("   ");
        assert!(!slot.is_set());
    }
}
