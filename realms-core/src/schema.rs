//! Structured turn-continuation contract.
//!
//! The narrator is asked for JSON matching [`TurnResult::response_schema`];
//! [`parse_turn_result`] turns whatever came back into a validated
//! [`TurnResult`] or a [`SchemaError`].

use realms_macros::ResponseSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Fewest choices a turn may offer.
pub const MIN_CHOICES: usize = 2;
/// Most choices a turn may offer.
pub const MAX_CHOICES: usize = 4;

/// The narrator's output could not be used (the turn is not retried).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed response: empty payload")]
    Empty,

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: expected {MIN_CHOICES}-{MAX_CHOICES} choices, got {0}")]
    ChoiceCount(usize),

    #[error("malformed response: duplicate choice id '{0}'")]
    DuplicateChoiceId(String),

    #[error("malformed response: choice '{0}' has no text")]
    BlankChoice(String),
}

/// One option offered to the player for the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ResponseSchema)]
pub struct Choice {
    pub id: String,
    /// The text description of the choice.
    pub text: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Instructions for changing the inventory; not a full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ResponseSchema)]
pub struct InventoryDelta {
    /// Items the player gains.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schema(optional)]
    pub add: Vec<String>,

    /// Items the player loses.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schema(optional)]
    pub remove: Vec<String>,
}

impl InventoryDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// The parsed continuation for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ResponseSchema)]
#[serde(rename_all = "camelCase")]
#[schema(rename_all = "camelCase")]
pub struct TurnResult {
    /// A short, evocative title for the current scene.
    pub scene_title: String,

    /// The narrative content of the current scene, approx 100-200 words.
    pub story_text: String,

    /// Two to four distinct options for what the player does next.
    pub choices: Vec<Choice>,

    /// Items gained or lost during this scene.
    #[serde(default)]
    pub inventory_updates: Option<InventoryDelta>,

    /// Update the current quest if changed, otherwise null or empty string.
    #[serde(default)]
    pub new_quest: Option<String>,

    /// A detailed visual description of the scene for an image generator. Include art style: 'Digital fantasy art, detailed, dramatic lighting'.
    pub image_prompt: String,

    /// If the character's appearance changes (e.g., got new armor), describe the new look briefly.
    #[serde(default)]
    pub character_visual_update: Option<String>,
}

impl TurnResult {
    /// The inventory delta, empty when the narrator sent none.
    pub fn inventory_delta(&self) -> InventoryDelta {
        self.inventory_updates.clone().unwrap_or_default()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse and validate raw narrator output.
pub fn parse_turn_result(raw: &str) -> Result<TurnResult, SchemaError> {
    let payload = strip_code_fence(raw.trim());
    if payload.is_empty() {
        return Err(SchemaError::Empty);
    }

    let mut turn: TurnResult = serde_json::from_str(payload)?;
    validate_choices(&turn.choices)?;

    turn.new_quest = non_blank(turn.new_quest.take());
    turn.character_visual_update = non_blank(turn.character_visual_update.take());

    Ok(turn)
}

fn validate_choices(choices: &[Choice]) -> Result<(), SchemaError> {
    if !(MIN_CHOICES..=MAX_CHOICES).contains(&choices.len()) {
        return Err(SchemaError::ChoiceCount(choices.len()));
    }

    let mut seen = HashSet::new();
    for choice in choices {
        if !seen.insert(choice.id.as_str()) {
            return Err(SchemaError::DuplicateChoiceId(choice.id.clone()));
        }
        if choice.text.trim().is_empty() {
            return Err(SchemaError::BlankChoice(choice.id.clone()));
        }
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Models sometimes wrap JSON in a Markdown fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return text;
    };
    // Drop an info string such as `json` on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with('{') => inner.trim(),
        _ => body.trim(),
    }
}
