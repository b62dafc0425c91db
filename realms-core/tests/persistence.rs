//! Save/load tests for the turn engine.
//!
//! These tests verify that game state is properly saved and restored.
//! Run with: `cargo test -p realms-core --test persistence`

use realms_core::persist::{self, SAVE_SLOT};
use realms_core::{
    FileStorage, ImageSize, MemoryStorage, PersistError, Storage, StorageError, TestHarness,
    TurnPhase, TurnScript,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let storage = FileStorage::new(temp_dir.path());

    let harness = TestHarness::new();
    harness.expect_turn(
        TurnScript::new("Copper Mine", "Picks ring in the dark.")
            .add(&["Pickaxe", "Candle"])
            .quest("Find the lost seam")
            .appearance("A miner with a soot-black beard"),
    );
    harness.engine.set_image_size(ImageSize::Size2K);
    harness.engine.submit_choice("").await;

    let saved = harness.engine.save(&storage).await.expect("save");
    assert!(saved.saved_at > 0);
    assert_eq!(harness.engine.snapshot().saved_at, saved.saved_at);
    assert!(storage.path_for(SAVE_SLOT).exists());

    let restored = TestHarness::new();
    assert!(restored.engine.load(&storage).await.expect("load"));

    assert_eq!(restored.engine.snapshot(), saved);
    assert_eq!(restored.engine.phase(), TurnPhase::TurnComplete);
    assert_eq!(restored.engine.image_size(), ImageSize::Size2K);
}

#[tokio::test]
async fn test_round_trip_with_empty_inventory_and_no_image() {
    let storage = MemoryStorage::new();

    let harness = TestHarness::gated();
    harness.expect_turn(TurnScript::new("Empty Road", "Nothing but dust."));
    harness.engine.submit_choice("").await;

    let saved = harness.engine.save(&storage).await.unwrap();
    assert!(saved.inventory.is_empty());
    assert!(saved.current_image.is_none());

    let document = storage.get(SAVE_SLOT).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&document).unwrap();
    assert!(value["currentImage"].is_null());
    assert_eq!(value["inventory"], serde_json::json!([]));

    let restored = TestHarness::new();
    restored.engine.load(&storage).await.unwrap();
    assert_eq!(restored.engine.snapshot(), saved);
}

#[tokio::test]
async fn test_load_without_save() {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path().join("never-created"));

    let harness = TestHarness::new();
    assert!(!harness.engine.load(&storage).await.unwrap());
    assert!(!harness.engine.is_started());
    assert_eq!(harness.engine.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_failed_save_changes_nothing() {
    let storage = MemoryStorage::with_quota(32);

    let harness = TestHarness::new();
    harness.expect_turn(TurnScript::new("Vault", "Gold everywhere.").add(&["Coin"]));
    harness.engine.submit_choice("").await;
    let before = harness.engine.snapshot();

    let err = harness.engine.save(&storage).await.unwrap_err();

    assert!(matches!(err, PersistError::Storage(StorageError::Full)));
    assert_eq!(harness.engine.snapshot(), before);
    assert_eq!(before.saved_at, 0);
    assert!(!persist::has_save(&storage).await.unwrap());
}

#[tokio::test]
async fn test_loaded_history_feeds_next_turn() {
    let storage = MemoryStorage::new();

    let original = TestHarness::new();
    original.expect_turn(TurnScript::new("Inn", "A fire crackles.").quest("Meet the stranger"));
    original.engine.submit_choice("").await;
    original.engine.save(&storage).await.unwrap();

    let restored = TestHarness::new();
    restored.engine.load(&storage).await.unwrap();
    restored.expect_turn(TurnScript::new("Back Room", "The stranger waits."));
    restored.engine.submit_choice("Enter the back room").await;

    let request = &restored.narrator.requests()[0];
    assert_eq!(request.contents.len(), 3);
    assert_eq!(request.contents[1].text(), "A fire crackles.");
    assert!(request.system_instruction.contains("Meet the stranger"));
}

#[tokio::test]
async fn test_save_without_image_size_loads_lowest_tier() {
    let storage = MemoryStorage::new();
    storage
        .set(
            SAVE_SLOT,
            r#"{"history":[],"currentText":"Old save.","choices":[],"inventory":["Map"],"quest":"","sceneTitle":"Attic","currentImage":null,"charDesc":"A child","started":true,"savedAt":1}"#,
        )
        .await
        .unwrap();

    let harness = TestHarness::new();
    assert!(harness.engine.load(&storage).await.unwrap());

    let state = harness.engine.snapshot();
    assert_eq!(state.image_size, ImageSize::Size1K);
    assert_eq!(state.inventory, vec!["Map".to_string()]);
    assert_eq!(state.character_description, "A child");
}

#[tokio::test]
async fn test_corrupt_save_is_an_error() {
    let storage = MemoryStorage::new();
    storage.set(SAVE_SLOT, "{ truncated").await.unwrap();

    let harness = TestHarness::new();
    assert!(matches!(
        harness.engine.load(&storage).await,
        Err(PersistError::Json(_))
    ));
    assert!(!harness.engine.is_started());
}

#[tokio::test]
async fn test_load_keeps_stashed_image() {
    let storage = MemoryStorage::new();

    let saver = TestHarness::new();
    saver.expect_turn(TurnScript::new("Harbor", "Boats bob."));
    saver.engine.submit_choice("").await;
    saver.engine.save(&storage).await.unwrap();

    let harness = TestHarness::gated();
    harness.expect_turn(TurnScript::new("Cellar", "Barrels.").image_prompt("a wine cellar"));
    harness.engine.submit_choice("").await;
    assert!(harness.engine.has_pending_image());

    harness.engine.load(&storage).await.unwrap();
    assert_eq!(harness.engine.snapshot().scene_title, "Harbor");
    assert_eq!(harness.engine.pending_image().unwrap().prompt, "a wine cellar");
}
