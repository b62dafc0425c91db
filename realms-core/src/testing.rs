//! Testing utilities for the turn engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedNarrator`, `RecordingIllustrator` and `ScriptedCompanion` for
//!   deterministic runs without API calls
//! - `ToggleCredentials` to drive the credential gate by hand
//! - `TurnScript` to build narrator payloads
//! - `TestHarness` to wire all of it into a `TurnEngine`

use crate::credential::{CredentialGate, CredentialStore};
use crate::engine::{EngineConfig, TurnEngine};
use crate::image::ImageOrchestrator;
use crate::provider::{
    ChatProvider, ImageProvider, ImageRequest, NarrativeProvider, NarrativeRequest, ProviderError,
};
use crate::state::EncodedImage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A narrator that returns scripted payloads in order.
#[derive(Default)]
pub struct ScriptedNarrator {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<NarrativeRequest>>,
    hold: Option<Arc<Notify>>,
}

impl ScriptedNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every call until `release` is notified. The request is recorded
    /// before parking.
    pub fn held(release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Self::default()
        }
    }

    /// Queue a raw payload.
    pub fn push_raw(&self, raw: impl Into<String>) {
        lock(&self.responses).push_back(Ok(raw.into()));
    }

    pub fn push_turn(&self, turn: &TurnScript) {
        self.push_raw(turn.to_json());
    }

    pub fn push_error(&self, err: ProviderError) {
        lock(&self.responses).push_back(Err(err));
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<NarrativeRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl NarrativeProvider for ScriptedNarrator {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, ProviderError> {
        lock(&self.requests).push(request.clone());
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        lock(&self.responses)
            .pop_front()
            .unwrap_or(Err(ProviderError::EmptyResponse))
    }
}

/// An image provider that records requests.
///
/// Queued results are returned first; after that every call yields a small
/// numbered PNG-typed image.
#[derive(Default)]
pub struct RecordingIllustrator {
    results: Mutex<VecDeque<Result<Option<EncodedImage>, ProviderError>>>,
    calls: Mutex<Vec<ImageRequest>>,
    hold: Option<Arc<Notify>>,
}

impl RecordingIllustrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every call until `release` is notified.
    pub fn held(release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Self::default()
        }
    }

    pub fn push_result(&self, result: Result<Option<EncodedImage>, ProviderError>) {
        lock(&self.results).push_back(result);
    }

    pub fn calls(&self) -> Vec<ImageRequest> {
        lock(&self.calls).clone()
    }
}

/// The image `RecordingIllustrator` produces for its `n`th call (1-based).
pub fn numbered_image(n: usize) -> EncodedImage {
    EncodedImage::new("image/png", format!("aW1hZ2U{n}"))
}

#[async_trait]
impl ImageProvider for RecordingIllustrator {
    async fn generate(&self, request: &ImageRequest) -> Result<Option<EncodedImage>, ProviderError> {
        let n = {
            let mut calls = lock(&self.calls);
            calls.push(request.clone());
            calls.len()
        };
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok(Some(numbered_image(n))))
    }
}

/// A companion backend with scripted replies.
#[derive(Default)]
pub struct ScriptedCompanion {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    questions: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompanion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Result<String, ProviderError>) {
        lock(&self.replies).push_back(reply);
    }

    /// `(message, context summary)` pairs received so far.
    pub fn questions(&self) -> Vec<(String, String)> {
        lock(&self.questions).clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedCompanion {
    async fn ask(&self, message: &str, context_summary: &str) -> Result<String, ProviderError> {
        lock(&self.questions).push((message.to_string(), context_summary.to_string()));
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// A credential store flipped by the test.
pub struct ToggleCredentials {
    selected: AtomicBool,
    grants_on_selection: bool,
    selections: AtomicUsize,
}

impl ToggleCredentials {
    /// Opening the selection flow selects a key.
    pub fn new(selected: bool) -> Self {
        Self {
            selected: AtomicBool::new(selected),
            grants_on_selection: true,
            selections: AtomicUsize::new(0),
        }
    }

    /// Opening the selection flow changes nothing (the player backed out).
    pub fn refusing(selected: bool) -> Self {
        Self {
            grants_on_selection: false,
            ..Self::new(selected)
        }
    }

    pub fn set(&self, selected: bool) {
        self.selected.store(selected, Ordering::SeqCst);
    }

    /// How many times the selection flow was opened.
    pub fn selections(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for ToggleCredentials {
    async fn has_selected_key(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }

    async fn open_selection(&self) {
        self.selections.fetch_add(1, Ordering::SeqCst);
        if self.grants_on_selection {
            self.set(true);
        }
    }
}

/// Builder for a narrator payload.
#[derive(Debug, Clone)]
pub struct TurnScript {
    value: Value,
}

impl TurnScript {
    /// A valid turn with two default choices and a derived image prompt.
    pub fn new(scene_title: &str, story_text: &str) -> Self {
        Self {
            value: json!({
                "sceneTitle": scene_title,
                "storyText": story_text,
                "choices": [
                    { "id": "1", "text": "Press on" },
                    { "id": "2", "text": "Turn back" }
                ],
                "imagePrompt": format!("{scene_title}, painted in muted tones"),
            }),
        }
    }

    /// Replace the choices; ids are assigned 1, 2, ...
    pub fn choices(mut self, texts: &[&str]) -> Self {
        let choices: Vec<Value> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| json!({ "id": (i + 1).to_string(), "text": text }))
            .collect();
        self.value["choices"] = Value::Array(choices);
        self
    }

    pub fn add(mut self, items: &[&str]) -> Self {
        self.value["inventoryUpdates"]["add"] = json!(items);
        self
    }

    pub fn remove(mut self, items: &[&str]) -> Self {
        self.value["inventoryUpdates"]["remove"] = json!(items);
        self
    }

    pub fn quest(mut self, quest: &str) -> Self {
        self.value["newQuest"] = json!(quest);
        self
    }

    pub fn appearance(mut self, description: &str) -> Self {
        self.value["characterVisualUpdate"] = json!(description);
        self
    }

    pub fn image_prompt(mut self, prompt: &str) -> Self {
        self.value["imagePrompt"] = json!(prompt);
        self
    }

    /// Drop a top-level field (by its wire name).
    pub fn without(mut self, field: &str) -> Self {
        if let Some(object) = self.value.as_object_mut() {
            object.remove(field);
        }
        self
    }

    pub fn to_json(&self) -> String {
        self.value.to_string()
    }
}

/// Test harness wiring fakes into a turn engine.
pub struct TestHarness {
    pub narrator: Arc<ScriptedNarrator>,
    pub illustrator: Arc<RecordingIllustrator>,
    pub credentials: Arc<ToggleCredentials>,
    pub engine: TurnEngine,
}

impl TestHarness {
    /// A harness whose credential gate is open.
    pub fn new() -> Self {
        Self::with_parts(
            ScriptedNarrator::new(),
            RecordingIllustrator::new(),
            ToggleCredentials::new(true),
            EngineConfig::default(),
        )
    }

    /// A harness whose credential gate starts closed.
    pub fn gated() -> Self {
        Self::with_parts(
            ScriptedNarrator::new(),
            RecordingIllustrator::new(),
            ToggleCredentials::new(false),
            EngineConfig::default(),
        )
    }

    pub fn with_parts(
        narrator: ScriptedNarrator,
        illustrator: RecordingIllustrator,
        credentials: ToggleCredentials,
        config: EngineConfig,
    ) -> Self {
        let narrator = Arc::new(narrator);
        let illustrator = Arc::new(illustrator);
        let credentials = Arc::new(credentials);

        let images = ImageOrchestrator::new(
            CredentialGate::new(credentials.clone()),
            illustrator.clone(),
        );
        let engine = TurnEngine::new(narrator.clone(), images, config);

        Self {
            narrator,
            illustrator,
            credentials,
            engine,
        }
    }

    /// Queue a scripted turn.
    pub fn expect_turn(&self, turn: TurnScript) -> &Self {
        self.narrator.push_turn(&turn);
        self
    }

    /// Queue a raw narrator payload.
    pub fn expect_raw(&self, raw: &str) -> &Self {
        self.narrator.push_raw(raw);
        self
    }

    /// Queue a narrator failure.
    pub fn expect_error(&self, err: ProviderError) -> &Self {
        self.narrator.push_error(err);
        self
    }

    pub fn inventory(&self) -> Vec<String> {
        self.engine.snapshot().inventory
    }

    pub fn image_calls(&self) -> usize {
        self.illustrator.calls().len()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
