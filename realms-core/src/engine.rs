//! The narrative turn engine.
//!
//! `TurnEngine` owns the game state and sequences each turn: narrator call,
//! schema validation, state merge, then the (possibly gated) illustration.
//! All methods take `&self`; the phase doubles as the in-flight lock, so a
//! second choice submitted while a turn is running is turned away instead of
//! interleaving with it.

use crate::image::{ImageOrchestrator, ImageOutcome, PendingImage};
use crate::inventory;
use crate::persist::{self, PersistError, Storage};
use crate::prompt;
use crate::provider::{NarrativeProvider, NarrativeRequest, ProviderError};
use crate::schema::{self, Choice, SchemaError, TurnResult};
use crate::state::{GameState, HistoryItem, ImageSize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Story text shown when a turn could not be generated.
pub const FALLBACK_STORY_TEXT: &str =
    "The mists of time swirl... something went wrong. Try again.";

/// Id of the single choice offered after a failed turn.
pub const RETRY_CHOICE_ID: &str = "retry";

/// Label of the retry choice when the very first turn failed.
pub const RETRY_START_TEXT: &str = "Begin the adventure";

/// Why a turn produced no new scene.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("narrative provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Malformed(#[from] SchemaError),
}

/// Where the engine is in the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Nothing played yet.
    Idle,
    AwaitingText,
    TextReady,
    AwaitingImage,
    /// The illustration was parked behind the credential gate.
    ImageBlocked,
    /// Ready for the next choice.
    TurnComplete,
}

impl TurnPhase {
    /// Whether a submitted choice is still being processed.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TurnPhase::AwaitingText | TurnPhase::TextReady | TurnPhase::AwaitingImage
        )
    }
}

/// What `submit_choice` did.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Another turn was in flight; nothing changed.
    Rejected,
    /// A new scene was applied. The image result never blocks the turn.
    Advanced { image: ImageOutcome },
    /// Text generation failed; the fallback narrative is showing.
    Failed(TurnError),
}

impl TurnOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, TurnOutcome::Rejected)
    }
}

/// Configuration for the turn engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many past history items accompany each narrator request.
    pub history_window: usize,

    /// Starting illustration tier.
    pub image_size: ImageSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: 4,
            image_size: ImageSize::Size1K,
        }
    }
}

impl EngineConfig {
    pub fn with_history_window(mut self, items: usize) -> Self {
        self.history_window = items;
        self
    }

    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }
}

/// The turn state machine.
pub struct TurnEngine {
    narrator: Arc<dyn NarrativeProvider>,
    images: ImageOrchestrator,
    config: EngineConfig,
    state: Mutex<GameState>,
    phase: watch::Sender<TurnPhase>,
}

impl TurnEngine {
    pub fn new(
        narrator: Arc<dyn NarrativeProvider>,
        images: ImageOrchestrator,
        config: EngineConfig,
    ) -> Self {
        let state = GameState {
            image_size: config.image_size,
            ..Default::default()
        };
        let (phase, _) = watch::channel(TurnPhase::Idle);

        Self {
            narrator,
            images,
            config,
            state: Mutex::new(state),
            phase,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> TurnPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes (e.g. to show text before the image arrives).
    pub fn subscribe(&self) -> watch::Receiver<TurnPhase> {
        self.phase.subscribe()
    }

    /// A copy of the current game state.
    pub fn snapshot(&self) -> GameState {
        self.state().clone()
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    pub fn context_summary(&self) -> String {
        self.state().context_summary()
    }

    pub fn image_size(&self) -> ImageSize {
        self.state().image_size
    }

    /// Change the tier used by the next illustration request.
    pub fn set_image_size(&self, size: ImageSize) {
        self.state().image_size = size;
        debug!(%size, "image size changed");
    }

    pub fn pending_image(&self) -> Option<PendingImage> {
        self.images.pending()
    }

    pub fn has_pending_image(&self) -> bool {
        self.images.has_pending()
    }

    pub fn images(&self) -> &ImageOrchestrator {
        &self.images
    }

    /// Play one turn. A blank choice begins the adventure.
    ///
    /// Picking the retry choice replays the turn that failed, including the
    /// opening one.
    pub async fn submit_choice(&self, choice: &str) -> TurnOutcome {
        if !self.claim_phase(TurnPhase::AwaitingText) {
            debug!(choice, "turn already in flight, ignoring choice");
            return TurnOutcome::Rejected;
        }

        let (choice, request) = {
            let state = self.state();
            let choice = replayed_choice(&state, choice);
            let request = NarrativeRequest {
                system_instruction: prompt::narrator_system_prompt(&state),
                contents: prompt::narrator_contents(
                    &state.history,
                    self.config.history_window,
                    choice,
                ),
                response_schema: TurnResult::response_schema(),
            };
            (choice, request)
        };
        info!(choice, "turn started");

        let turn = match self.generate_turn(&request).await {
            Ok(turn) => turn,
            Err(err) => {
                warn!(error = %err, "turn generation failed, showing fallback");
                self.apply_failure(choice);
                self.set_phase(TurnPhase::TurnComplete);
                return TurnOutcome::Failed(err);
            }
        };

        let size = self.apply_turn(&request, &turn);
        self.set_phase(TurnPhase::TextReady);
        info!(scene = %turn.scene_title, "scene ready");

        self.set_phase(TurnPhase::AwaitingImage);
        let image = self.images.request(&turn.image_prompt, size).await;
        self.apply_image(&image);
        if image.is_deferred() {
            self.set_phase(TurnPhase::ImageBlocked);
        }
        self.set_phase(TurnPhase::TurnComplete);

        TurnOutcome::Advanced { image }
    }

    /// Re-issue the stashed illustration once the selection flow has finished.
    ///
    /// Holds the phase like a turn does, so it never races a running turn's
    /// illustration. Returns `None` if nothing was stashed or a turn is in flight.
    pub async fn resume_image(&self) -> Option<ImageOutcome> {
        if !self.images.has_pending() {
            return None;
        }
        if !self.claim_phase(TurnPhase::AwaitingImage) {
            debug!("turn in flight, not resuming stashed image");
            return None;
        }

        let outcome = self.images.resume().await;
        if let Some(outcome) = &outcome {
            self.apply_image(outcome);
            if outcome.is_deferred() {
                self.set_phase(TurnPhase::ImageBlocked);
            }
        }
        self.set_phase(TurnPhase::TurnComplete);
        outcome
    }

    /// Run the credential selection flow, then resume any stashed illustration.
    pub async fn select_credential_and_resume(&self) -> Option<ImageOutcome> {
        self.images.gate().request_selection().await;
        self.resume_image().await
    }

    /// Write the whole state to `storage`, stamping `savedAt`.
    ///
    /// On failure the in-memory state is left as it was.
    pub async fn save(&self, storage: &dyn Storage) -> Result<GameState, PersistError> {
        let mut snapshot = self.snapshot();
        snapshot.saved_at = persist::now_millis();

        persist::save(storage, &snapshot).await?;

        self.state().saved_at = snapshot.saved_at;
        info!(saved_at = snapshot.saved_at, "game saved");
        Ok(snapshot)
    }

    /// Replace the state with the saved one. Returns `false` if nothing was saved.
    pub async fn load(&self, storage: &dyn Storage) -> Result<bool, PersistError> {
        if self.phase().is_in_flight() {
            return Err(PersistError::TurnInFlight);
        }
        match persist::load(storage).await? {
            Some(saved) => {
                self.restore(saved)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Install `state` wholesale and skip straight past the intro.
    pub fn restore(&self, mut state: GameState) -> Result<(), PersistError> {
        let claimed = self.phase.send_if_modified(|phase| {
            if phase.is_in_flight() {
                false
            } else {
                *phase = TurnPhase::TurnComplete;
                true
            }
        });
        if !claimed {
            return Err(PersistError::TurnInFlight);
        }

        state.started = true;
        info!(scene = %state.scene_title, "game state restored");
        *self.state() = state;
        Ok(())
    }

    async fn generate_turn(&self, request: &NarrativeRequest) -> Result<TurnResult, TurnError> {
        let raw = self.narrator.generate(request).await?;
        Ok(schema::parse_turn_result(&raw)?)
    }

    /// Merge a successful turn. Returns the tier for its illustration.
    fn apply_turn(&self, request: &NarrativeRequest, turn: &TurnResult) -> ImageSize {
        let mut state = self.state();

        let delta = turn.inventory_delta();
        if !delta.is_empty() {
            debug!(add = ?delta.add, remove = ?delta.remove, "reconciling inventory");
        }
        state.inventory = inventory::reconcile(&state.inventory, &delta);

        if let Some(quest) = &turn.new_quest {
            state.quest = quest.clone();
        }
        if let Some(look) = &turn.character_visual_update {
            state.character_description = look.clone();
        }

        state.scene_title = turn.scene_title.clone();
        state.current_text = turn.story_text.clone();
        state.choices = turn.choices.clone();
        state.history.push(HistoryItem::user(request.turn_content()));
        state.history.push(HistoryItem::model(turn.story_text.clone()));
        state.started = true;

        state.image_size
    }

    /// Show the fallback line and a way forward; nothing else changes.
    fn apply_failure(&self, choice: &str) {
        let mut state = self.state();
        state.current_text = FALLBACK_STORY_TEXT.to_string();
        state.choices = vec![retry_choice(choice)];
        state.started = true;
    }

    fn apply_image(&self, outcome: &ImageOutcome) {
        if let Some(image) = outcome.image() {
            self.state().current_image = Some(image.clone());
        }
    }

    /// Move to `next` unless something is already in flight.
    fn claim_phase(&self, next: TurnPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if phase.is_in_flight() {
                false
            } else {
                *phase = next;
                true
            }
        })
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.phase.send_replace(phase);
        debug!(?phase, "turn phase");
    }

    fn state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The choice to actually send. The retry offered after a failed opening turn
/// stands for the blank start choice, not for its own label.
fn replayed_choice<'a>(state: &GameState, choice: &'a str) -> &'a str {
    let opening_retry = state.history.is_empty()
        && choice.trim() == RETRY_START_TEXT
        && matches!(
            state.choices.as_slice(),
            [only] if only.id == RETRY_CHOICE_ID && only.text == RETRY_START_TEXT
        );
    if opening_retry {
        ""
    } else {
        choice
    }
}

fn retry_choice(failed_choice: &str) -> Choice {
    let text = match failed_choice.trim() {
        "" => RETRY_START_TEXT,
        text => text,
    };
    Choice::new(RETRY_CHOICE_ID, text)
}
