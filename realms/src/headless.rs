//! Headless mode: a line-oriented protocol on stdin/stdout.
//!
//! - A number picks the matching choice; any other text is sent as-is
//! - Lines starting with `#` are commands (save, load, key, ask, ...)
//! - Output lines are tagged `[SCENE]`, `[CHOICES]`, `[IMAGE]`, `[ERROR]`, ...

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use realms_core::persist::SAVE_SLOT;
use realms_core::{
    CredentialStore, GameSession, GameState, ImageOutcome, ImageSize, KeySlot, SessionConfig,
    TurnOutcome, TurnPhase,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

/// Stdin, shared between the command loop and the key prompt.
pub type Input = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> Input {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

async fn next_line(input: &Input) -> io::Result<Option<String>> {
    input.lock().await.next_line().await
}

fn flush() {
    io::stdout().flush().ok();
}

/// Key selection by pasting a key on the next input line.
pub struct PromptCredentials {
    keys: KeySlot,
    input: Input,
}

impl PromptCredentials {
    pub fn new(keys: KeySlot, input: Input) -> Self {
        Self { keys, input }
    }
}

#[async_trait]
impl CredentialStore for PromptCredentials {
    async fn has_selected_key(&self) -> bool {
        self.keys.is_set()
    }

    async fn open_selection(&self) {
        println!("[KEY] Paste a Gemini API key (empty line to cancel):");
        flush();
        match next_line(&self.input).await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                self.keys.set(line);
                println!("[KEY] Key selected.");
            }
            Ok(_) => println!("[KEY] No key entered."),
            Err(e) => warn!(error = %e, "failed to read API key"),
        }
    }
}

/// Run the game in headless mode until `#quit` or end of input.
pub async fn run_headless(
    config: SessionConfig,
    keys: KeySlot,
    credentials: Arc<PromptCredentials>,
    input: Input,
) -> io::Result<()> {
    let session = GameSession::new(config, keys.clone(), credentials.clone());

    println!("=== Infinite Realms ===");
    println!("Type a choice number, or anything you like. #help lists commands.");
    println!();

    if !keys.is_set() {
        println!("[KEY] No GEMINI_API_KEY found.");
        credentials.open_selection().await;
    }

    if session.has_save().await.unwrap_or(false) {
        println!("A saved game exists. Type #load to continue, or press enter to begin anew.");
    } else {
        play(&session, "").await;
    }
    flush();

    while let Some(line) = next_line(&input).await? {
        let line = line.trim();

        if line.is_empty() {
            if !session.engine().is_started() {
                play(&session, "").await;
            }
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            if !handle_command(&session, command).await {
                break;
            }
            flush();
            continue;
        }

        let choice = resolve_choice(&session.state(), line);
        play(&session, &choice).await;
        flush();
    }

    Ok(())
}

/// Returns `false` when the player asked to quit.
async fn handle_command(session: &GameSession, command: &str) -> bool {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => {
            println!("Goodbye!");
            return false;
        }
        "save" => match session.save().await {
            Ok(_) => println!(
                "[SAVED] Game saved to {}",
                session.storage().path_for(SAVE_SLOT).display()
            ),
            Err(e) => println!("[ERROR] Save failed: {e}"),
        },
        "load" => match session.load().await {
            Ok(true) => {
                println!("[LOADED] Welcome back.");
                print_scene(&session.state());
            }
            Ok(false) => println!("[ERROR] No saved game found."),
            Err(e) => println!("[ERROR] Load failed: {e}"),
        },
        "status" => print_status(session),
        "size" => {
            if rest.is_empty() {
                println!("[SIZE] {}", session.engine().image_size());
            } else {
                match rest.parse::<ImageSize>() {
                    Ok(size) => {
                        session.set_image_size(size);
                        println!("[SIZE] New illustrations will be {size}.");
                    }
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
        }
        "key" => match session.select_key().await {
            Some(outcome) => print_image(&outcome),
            None => println!("[KEY] No illustration was waiting."),
        },
        "ask" => {
            if rest.is_empty() {
                println!("[ERROR] Usage: #ask <question>");
            } else if let Some(reply) = session.ask(rest).await {
                println!("[GUIDE] {reply}");
            }
        }
        "image" => export_image(session, rest).await,
        "help" => print_commands(),
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }

    true
}

/// Play one turn, showing the text as soon as it lands.
async fn play(session: &GameSession, choice: &str) {
    let mut phases = session.engine().subscribe();

    let turn = session.choose(choice);
    tokio::pin!(turn);

    let mut shown = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Ok(()) = phases.changed(), if !shown => {
                if *phases.borrow_and_update() == TurnPhase::AwaitingImage {
                    print_scene(&session.state());
                    println!("[IMAGE] Painting the scene...");
                    flush();
                    shown = true;
                }
            }
        }
    };

    match &outcome {
        TurnOutcome::Rejected => println!("[BUSY] Still working on the last turn."),
        TurnOutcome::Advanced { image } => {
            if !shown {
                print_scene(&session.state());
            }
            print_image(image);
        }
        TurnOutcome::Failed(err) => {
            println!("[ERROR] {err}");
            print_scene(&session.state());
        }
    }

    if wants_key(&outcome) {
        offer_key(session).await;
    }
}

/// Whether the turn left its illustration waiting for a key.
fn wants_key(outcome: &TurnOutcome) -> bool {
    matches!(outcome, TurnOutcome::Advanced { image } if image.is_deferred())
}

/// Open key selection right away for an illustration that is waiting on one.
async fn offer_key(session: &GameSession) {
    flush();
    if let Some(outcome) = session.select_key().await {
        print_image(&outcome);
    }
}

/// A number selects the matching choice; anything else is taken literally.
fn resolve_choice(state: &GameState, line: &str) -> String {
    line.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| state.choices.get(i))
        .map(|choice| choice.text.clone())
        .unwrap_or_else(|| line.to_string())
}

fn print_scene(state: &GameState) {
    println!();
    if !state.scene_title.is_empty() {
        println!("[SCENE] {}", state.scene_title);
    }
    for para in state.current_text.split("\n\n") {
        println!("{para}");
    }
    println!();
    println!("[CHOICES]");
    for (i, choice) in state.choices.iter().enumerate() {
        println!("  {}. {}", i + 1, choice.text);
    }
}

fn print_image(outcome: &ImageOutcome) {
    match outcome {
        ImageOutcome::Generated(image) => {
            println!("[IMAGE] Illustration ready ({}). #image saves it.", image.mime_type)
        }
        ImageOutcome::Empty => println!("[IMAGE] No illustration this time."),
        ImageOutcome::Deferred(reason) => {
            println!("[IMAGE] Waiting for an API key ({reason}). #key selects one later.")
        }
        ImageOutcome::Failed(e) => println!("[IMAGE] Illustration failed: {e}"),
    }
}

fn print_status(session: &GameSession) {
    let state = session.state();
    let or_none = |s: &str| if s.is_empty() { "(none)".to_string() } else { s.to_string() };

    println!("[STATUS]");
    println!("  Scene: {}", or_none(&state.scene_title));
    println!("  Quest: {}", or_none(&state.quest));
    println!("  Inventory: {}", or_none(&state.inventory.join(", ")));
    println!("  Appearance: {}", state.character_description);
    println!("  Image size: {}", state.image_size);
    println!(
        "  Illustration: {}",
        if state.current_image.is_some() { "ready" } else { "none" }
    );
    if let Some(pending) = session.engine().pending_image() {
        println!("  Waiting for a key: \"{}\" ({})", pending.prompt, pending.size);
    }
}

fn print_commands() {
    println!("[HELP]");
    println!("  <number>          - Pick a choice");
    println!("  <text>            - Do something else");
    println!("  #save             - Save the game");
    println!("  #load             - Load the saved game");
    println!("  #status           - Show scene, quest and inventory");
    println!("  #size [1K|2K|4K]  - Show or set the illustration size");
    println!("  #key              - Select an API key and finish any waiting illustration");
    println!("  #ask <question>   - Ask your companion");
    println!("  #image [path]     - Save the current illustration");
    println!("  #quit             - Exit the game");
}

async fn export_image(session: &GameSession, path: &str) {
    let Some(image) = session.state().current_image else {
        println!("[ERROR] No illustration yet.");
        return;
    };
    let path = if path.is_empty() {
        PathBuf::from(format!("scene.{}", image.extension()))
    } else {
        PathBuf::from(path)
    };

    let bytes = match STANDARD.decode(image.data.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("[ERROR] Illustration data is not valid base64: {e}");
            return;
        }
    };
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => println!("[IMAGE] Saved to {}", path.display()),
        Err(e) => println!("[ERROR] Could not write {}: {e}", path.display()),
    }
}

/// Parse session configuration from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> SessionConfig {
    let mut config = SessionConfig::new();

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--size", Some(size)) => {
                match size.parse::<ImageSize>() {
                    Ok(size) => config = config.with_image_size(size),
                    Err(e) => eprintln!("Ignoring --size: {e}"),
                }
                i += 1;
            }
            ("--save-dir", Some(dir)) => {
                config = config.with_save_dir(dir);
                i += 1;
            }
            ("--story-model", Some(model)) => {
                config = config.with_story_model(model);
                i += 1;
            }
            ("--image-model", Some(model)) => {
                config = config.with_image_model(model);
                i += 1;
            }
            ("--chat-model", Some(model)) => {
                config = config.with_chat_model(model);
                i += 1;
            }
            ("--history", Some(items)) => {
                match items.parse::<usize>() {
                    Ok(items) => config = config.with_history_window(items),
                    Err(e) => eprintln!("Ignoring --history: {e}"),
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use realms_core::Choice;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config_from_args(&args(&[
            "realms",
            "--size",
            "4k",
            "--save-dir",
            "/tmp/realms",
            "--story-model",
            "story-x",
            "--history",
            "8",
        ]));

        assert_eq!(config.image_size, ImageSize::Size4K);
        assert_eq!(config.save_dir, PathBuf::from("/tmp/realms"));
        assert_eq!(config.story_model, "story-x");
        assert_eq!(config.history_window, 8);
    }

    #[test]
    fn test_parse_config_ignores_bad_values() {
        let config = parse_config_from_args(&args(&["realms", "--size", "8K", "--history"]));
        assert_eq!(config.image_size, ImageSize::Size1K);
        assert_eq!(config.history_window, SessionConfig::new().history_window);
    }

    #[test]
    fn test_wants_key_only_for_deferred_images() {
        use realms_core::{DeferReason, ProviderError};

        let deferred = TurnOutcome::Advanced {
            image: ImageOutcome::Deferred(DeferReason::CredentialInvalid),
        };
        let failed = TurnOutcome::Advanced {
            image: ImageOutcome::Failed(ProviderError::Network("reset".to_string())),
        };

        assert!(wants_key(&deferred));
        assert!(!wants_key(&failed));
        assert!(!wants_key(&TurnOutcome::Advanced { image: ImageOutcome::Empty }));
        assert!(!wants_key(&TurnOutcome::Rejected));
    }

    #[test]
    fn test_resolve_choice() {
        let state = GameState {
            choices: vec![Choice::new("a", "Open the door"), Choice::new("b", "Wait")],
            ..Default::default()
        };

        assert_eq!(resolve_choice(&state, "2"), "Wait");
        assert_eq!(resolve_choice(&state, "0"), "0");
        assert_eq!(resolve_choice(&state, "3"), "3");
        assert_eq!(resolve_choice(&state, "Climb the wall"), "Climb the wall");
    }
}
