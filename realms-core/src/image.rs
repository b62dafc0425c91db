//! Scene illustration requests behind the credential gate.
//!
//! A request that cannot proceed for lack of a valid key is not an error:
//! the prompt is parked in a single stash slot until the front end finishes
//! the selection flow and calls [`ImageOrchestrator::resume`].

use crate::credential::CredentialGate;
use crate::provider::{ImageProvider, ImageRequest, ProviderError};
use crate::state::{EncodedImage, ImageSize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Provider message meaning the selected key refers to nothing the backend knows.
const INVALID_KEY_PATTERN: &str = "Requested entity was not found";

/// Why an image request was parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeferReason {
    #[error("no credential selected")]
    GateClosed,

    #[error("API_KEY_MISSING")]
    CredentialMissing,

    #[error("API_KEY_INVALID")]
    CredentialInvalid,
}

/// Result of one image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// The provider produced an image.
    Generated(EncodedImage),
    /// The provider answered without an image part.
    Empty,
    /// Parked awaiting credential selection.
    Deferred(DeferReason),
    /// Any other provider failure. The turn keeps its text.
    Failed(ProviderError),
}

impl ImageOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, ImageOutcome::Deferred(_))
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            ImageOutcome::Generated(image) => Some(image),
            _ => None,
        }
    }
}

/// A parked image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub prompt: String,
    pub size: ImageSize,
}

/// Map a provider error onto the gating protocol.
///
/// Returns `None` for failures that are not about credentials.
pub fn classify(err: &ProviderError) -> Option<DeferReason> {
    match err {
        ProviderError::MissingKey => Some(DeferReason::CredentialMissing),
        ProviderError::Api { message, .. } if message.contains(INVALID_KEY_PATTERN) => {
            Some(DeferReason::CredentialInvalid)
        }
        _ => None,
    }
}

/// Requests illustrations and owns the pending-prompt stash.
pub struct ImageOrchestrator {
    gate: CredentialGate,
    provider: Arc<dyn ImageProvider>,
    pending: Mutex<Option<PendingImage>>,
}

impl ImageOrchestrator {
    pub fn new(gate: CredentialGate, provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            gate,
            provider,
            pending: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &CredentialGate {
        &self.gate
    }

    /// Request an illustration, consulting the gate first.
    ///
    /// The stash only ever holds the latest request: any answer that is not a
    /// deferral drops an older parked prompt.
    pub async fn request(&self, prompt: &str, size: ImageSize) -> ImageOutcome {
        if !self.gate.has_credential().await {
            debug!(%size, "image request gated, stashing prompt");
            self.stash(prompt, size);
            return ImageOutcome::Deferred(DeferReason::GateClosed);
        }

        let request = ImageRequest::scene(prompt, size);
        let outcome = match self.provider.generate(&request).await {
            Ok(Some(image)) => {
                info!(%size, mime = %image.mime_type, "scene illustration generated");
                ImageOutcome::Generated(image)
            }
            Ok(None) => {
                warn!(%size, "image provider returned no image");
                ImageOutcome::Empty
            }
            Err(err) => match classify(&err) {
                Some(reason) => {
                    warn!(%reason, "image credential rejected, stashing prompt");
                    self.stash(prompt, size);
                    return ImageOutcome::Deferred(reason);
                }
                None => {
                    warn!(error = %err, "image generation failed");
                    ImageOutcome::Failed(err)
                }
            },
        };

        if self.take_pending().is_some() {
            debug!("dropping stashed prompt superseded by a newer request");
        }
        outcome
    }

    /// Re-issue the stashed request, if any.
    ///
    /// The stash is emptied before the provider is called, so a resume can
    /// never fire twice for the same prompt. If the retry is gated again the
    /// prompt goes straight back into the stash.
    pub async fn resume(&self) -> Option<ImageOutcome> {
        let pending = self.take_pending()?;
        info!(size = %pending.size, "resuming stashed image request");
        Some(self.request(&pending.prompt, pending.size).await)
    }

    pub fn pending(&self) -> Option<PendingImage> {
        self.lock_pending().clone()
    }

    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    fn stash(&self, prompt: &str, size: ImageSize) {
        let previous = self.lock_pending().replace(PendingImage {
            prompt: prompt.to_string(),
            size,
        });
        if previous.is_some() {
            // One slot only; the older scene never gets its picture.
            debug!("replacing previously stashed image prompt");
        }
    }

    fn take_pending(&self) -> Option<PendingImage> {
        self.lock_pending().take()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingImage>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
