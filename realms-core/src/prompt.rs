//! Prompt construction for the narrator and the companion.

use crate::state::{GameState, HistoryItem};

/// Turn content used when the player has not chosen anything yet.
pub const START_INSTRUCTION: &str = "Start a new adventure. Establish a setting and a character.";

/// Build the narrator's system instructions for the current state.
pub fn narrator_system_prompt(state: &GameState) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/narrator.txt"));

    let inventory =
        serde_json::to_string(&state.inventory).unwrap_or_else(|_| "[]".to_string());

    prompt.push_str("\nCurrent State:\n");
    prompt.push_str(&format!("- Inventory: {inventory}\n"));
    prompt.push_str(&format!("- Active Quest: {}\n", state.quest));
    prompt.push_str(&format!(
        "- Character Appearance: {}\n",
        state.character_description
    ));
    if !state.scene_title.is_empty() {
        prompt.push_str(&format!("- Current Scene: {}\n", state.scene_title));
    }

    prompt
}

/// The player's turn content. Blank choices begin the adventure.
pub fn turn_content(choice: &str) -> String {
    let choice = choice.trim();
    if choice.is_empty() {
        START_INSTRUCTION.to_string()
    } else {
        format!("I choose: {choice}")
    }
}

/// The last `window` history items followed by this turn's content.
pub fn narrator_contents(history: &[HistoryItem], window: usize, choice: &str) -> Vec<HistoryItem> {
    let start = history.len().saturating_sub(window);
    let mut contents = history[start..].to_vec();
    contents.push(HistoryItem::user(turn_content(choice)));
    contents
}

/// System instructions for the companion, grounded in the world summary.
pub fn companion_system_prompt(context_summary: &str) -> String {
    format!(
        "{}You know the current state of the world: {context_summary}.\n",
        include_str!("prompts/companion.txt")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_content() {
        assert_eq!(turn_content(""), START_INSTRUCTION);
        assert_eq!(turn_content("   "), START_INSTRUCTION);
        assert_eq!(turn_content("Open the door"), "I choose: Open the door");
    }

    #[test]
    fn test_system_prompt_embeds_state() {
        let state = GameState {
            inventory: vec!["Torch".to_string(), "Torch".to_string()],
            quest: "Reach the lighthouse".to_string(),
            character_description: "A tall ranger in green".to_string(),
            ..Default::default()
        };

        let prompt = narrator_system_prompt(&state);
        assert!(prompt.contains(r#"- Inventory: ["Torch","Torch"]"#));
        assert!(prompt.contains("- Active Quest: Reach the lighthouse"));
        assert!(prompt.contains("- Character Appearance: A tall ranger in green"));
        assert!(prompt.contains("JSON matching the defined schema"));
        assert!(!prompt.contains("Current Scene"));
    }

    #[test]
    fn test_contents_window() {
        let history = vec![
            HistoryItem::user("one"),
            HistoryItem::model("two"),
            HistoryItem::user("three"),
            HistoryItem::model("four"),
        ];

        let contents = narrator_contents(&history, 2, "Run");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].text(), "three");
        assert_eq!(contents[2].text(), "I choose: Run");

        let contents = narrator_contents(&history, 0, "");
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].text(), START_INSTRUCTION);

        let contents = narrator_contents(&history, 10, "Run");
        assert_eq!(contents.len(), 5);
    }

    #[test]
    fn test_companion_prompt() {
        let prompt = companion_system_prompt("Current Scene: Docks. Quest: . Inventory: ");
        assert!(prompt.contains("companion"));
        assert!(prompt.ends_with("Current Scene: Docks. Quest: . Inventory: .\n"));
    }
}
