//! Game state owned by the turn engine.
//!
//! `GameState` is the full persistable snapshot. The JSON field names match
//! the save documents written by earlier releases so old saves keep loading.

use crate::schema::Choice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Character description used before the narrator supplies one.
pub const DEFAULT_CHARACTER_DESCRIPTION: &str = "A mysterious traveler in worn clothes.";

/// The complete, persistable state of one adventure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Conversation so far, oldest first.
    pub history: Vec<HistoryItem>,

    /// Story text currently shown to the player.
    pub current_text: String,

    /// Options offered for the next turn.
    pub choices: Vec<Choice>,

    /// Carried items. Order matters and duplicates are allowed.
    pub inventory: Vec<String>,

    /// Active quest text.
    pub quest: String,

    /// Title of the current scene.
    pub scene_title: String,

    /// Most recent illustration. May belong to an earlier turn.
    pub current_image: Option<EncodedImage>,

    /// How the player character looks, fed back into image prompts.
    #[serde(rename = "charDesc")]
    pub character_description: String,

    /// Whether the adventure has begun (the intro is behind us).
    pub started: bool,

    /// Resolution tier for new illustrations.
    #[serde(default)]
    pub image_size: ImageSize,

    /// When this state was last saved, in epoch milliseconds.
    pub saved_at: i64,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            current_text: String::new(),
            choices: Vec::new(),
            inventory: Vec::new(),
            quest: String::new(),
            scene_title: String::new(),
            current_image: None,
            character_description: DEFAULT_CHARACTER_DESCRIPTION.to_string(),
            started: false,
            image_size: ImageSize::default(),
            saved_at: 0,
        }
    }
}

impl GameState {
    /// One-line world summary handed to the companion assistant.
    pub fn context_summary(&self) -> String {
        format!(
            "Current Scene: {}. Quest: {}. Inventory: {}",
            self.scene_title,
            self.quest,
            self.inventory.join(", ")
        )
    }
}

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

/// A text fragment of a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    pub text: String,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub role: HistoryRole,
    pub parts: Vec<HistoryPart>,
}

impl HistoryItem {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Model,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    /// All parts joined into one string.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Resolution tier for generated illustrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    Size1K,
    #[serde(rename = "2K")]
    Size2K,
    #[serde(rename = "4K")]
    Size4K,
}

impl ImageSize {
    pub const ALL: [ImageSize; 3] = [ImageSize::Size1K, ImageSize::Size2K, ImageSize::Size4K];

    /// Wire name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Size1K => "1K",
            ImageSize::Size2K => "2K",
            ImageSize::Size4K => "4K",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown image size '{0}' (expected 1K, 2K or 4K)")]
pub struct ParseImageSizeError(String);

impl FromStr for ImageSize {
    type Err = ParseImageSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageSize::Size1K),
            "2K" => Ok(ImageSize::Size2K),
            "4K" => Ok(ImageSize::Size4K),
            _ => Err(ParseImageSizeError(s.to_string())),
        }
    }
}

/// A base64-encoded image with its media type.
///
/// Serialized as a `data:` URL so it can be dropped straight into a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Render as `data:<mime>;base64,<data>`.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// File extension matching the media type.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a base64 data URL")]
pub struct InvalidDataUrl;

impl FromStr for EncodedImage {
    type Err = InvalidDataUrl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("data:").ok_or(InvalidDataUrl)?;
        let (mime_type, data) = rest.split_once(";base64,").ok_or(InvalidDataUrl)?;
        if mime_type.is_empty() {
            return Err(InvalidDataUrl);
        }
        Ok(Self::new(mime_type, data))
    }
}

impl TryFrom<String> for EncodedImage {
    type Error = InvalidDataUrl;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EncodedImage> for String {
    fn from(image: EncodedImage) -> Self {
        image.to_data_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = GameState::default();
        assert!(!state.started);
        assert!(state.inventory.is_empty());
        assert_eq!(state.character_description, DEFAULT_CHARACTER_DESCRIPTION);
        assert_eq!(state.image_size, ImageSize::Size1K);
        assert!(state.current_image.is_none());
    }

    #[test]
    fn test_context_summary() {
        let state = GameState {
            scene_title: "The Sunken Gate".to_string(),
            quest: "Find the lantern".to_string(),
            inventory: vec!["Rope".to_string(), "Torch".to_string()],
            ..Default::default()
        };
        assert_eq!(
            state.context_summary(),
            "Current Scene: The Sunken Gate. Quest: Find the lantern. Inventory: Rope, Torch"
        );
    }

    #[test]
    fn test_image_size_parsing() {
        assert_eq!("2k".parse::<ImageSize>().unwrap(), ImageSize::Size2K);
        assert_eq!(" 4K ".parse::<ImageSize>().unwrap(), ImageSize::Size4K);
        assert!("8K".parse::<ImageSize>().is_err());
        assert_eq!(ImageSize::Size1K.to_string(), "1K");
    }

    #[test]
    fn test_image_size_wire_names() {
        assert_eq!(serde_json::to_string(&ImageSize::Size4K).unwrap(), "\"4K\"");
        let size: ImageSize = serde_json::from_str("\"2K\"").unwrap();
        assert_eq!(size, ImageSize::Size2K);
    }

    #[test]
    fn test_encoded_image_data_url() {
        let image = EncodedImage::new("image/png", "iVBORw0KGgo=");
        assert_eq!(image.to_data_url(), "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(image.to_data_url().parse::<EncodedImage>().unwrap(), image);
        assert_eq!(image.extension(), "png");

        assert_eq!("https://x/y.png".parse::<EncodedImage>(), Err(InvalidDataUrl));
        assert_eq!("data:;base64,abc".parse::<EncodedImage>(), Err(InvalidDataUrl));
    }

    #[test]
    fn test_history_item_text() {
        let item = HistoryItem {
            role: HistoryRole::Model,
            parts: vec![
                HistoryPart { text: "The door ".to_string() },
                HistoryPart { text: "creaks.".to_string() },
            ],
        };
        assert_eq!(item.text(), "The door creaks.");
        assert_eq!(
            serde_json::to_value(HistoryItem::user("hi")).unwrap()["role"],
            "user"
        );
    }
}
