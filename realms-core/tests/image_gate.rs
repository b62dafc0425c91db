//! Credential gating and stash-and-resume for scene illustrations.
//!
//! Run with: `cargo test -p realms-core --test image_gate`

use realms_core::testing::numbered_image;
use realms_core::{
    DeferReason, EngineConfig, ImageOutcome, ImageSize, PendingImage, ProviderError,
    RecordingIllustrator, ScriptedNarrator, TestHarness, ToggleCredentials, TurnOutcome,
    TurnPhase, TurnScript,
};
use std::sync::Arc;
use tokio::sync::Notify;

fn invalid_key_error() -> ProviderError {
    ProviderError::Api {
        status: 404,
        message: "Requested entity was not found.".to_string(),
    }
}

#[tokio::test]
async fn test_gated_turn_keeps_text_and_stashes_prompt() {
    let harness = TestHarness::gated();
    harness.expect_turn(
        TurnScript::new("Sunken Chapel", "Water laps at the pews.")
            .image_prompt("a flooded chapel at dusk"),
    );

    let outcome = harness.engine.submit_choice("").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Advanced {
            image: ImageOutcome::Deferred(DeferReason::GateClosed)
        }
    ));
    let state = harness.engine.snapshot();
    assert_eq!(state.current_text, "Water laps at the pews.");
    assert!(state.current_image.is_none());
    assert_eq!(harness.image_calls(), 0);
    assert_eq!(
        harness.engine.pending_image(),
        Some(PendingImage {
            prompt: "a flooded chapel at dusk".to_string(),
            size: ImageSize::Size1K,
        })
    );
    assert_eq!(harness.engine.phase(), TurnPhase::TurnComplete);
}

#[tokio::test]
async fn test_selection_resumes_exactly_once() {
    let harness = TestHarness::gated();
    harness.expect_turn(
        TurnScript::new("Sunken Chapel", "Water laps at the pews.")
            .image_prompt("a flooded chapel at dusk"),
    );
    harness.engine.submit_choice("").await;

    let resumed = harness.engine.select_credential_and_resume().await;

    assert_eq!(resumed, Some(ImageOutcome::Generated(numbered_image(1))));
    assert_eq!(harness.credentials.selections(), 1);
    assert!(!harness.engine.has_pending_image());
    assert_eq!(harness.engine.snapshot().current_image, Some(numbered_image(1)));

    let calls = harness.illustrator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "a flooded chapel at dusk");

    assert!(harness.engine.resume_image().await.is_none());
    assert_eq!(harness.image_calls(), 1);
}

#[tokio::test]
async fn test_resume_uses_stashed_size() {
    let harness = TestHarness::gated();
    harness.expect_turn(TurnScript::new("Glacier", "Blue ice groans."));
    harness.engine.submit_choice("").await;

    harness.engine.set_image_size(ImageSize::Size4K);
    harness.credentials.set(true);
    harness.engine.resume_image().await;

    let calls = harness.illustrator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].size, ImageSize::Size1K);
    assert_eq!(harness.engine.image_size(), ImageSize::Size4K);
}

#[tokio::test]
async fn test_abandoned_selection_keeps_prompt() {
    let harness = TestHarness::with_parts(
        ScriptedNarrator::new(),
        RecordingIllustrator::new(),
        ToggleCredentials::refusing(false),
        EngineConfig::default(),
    );
    harness.expect_turn(TurnScript::new("Moor", "Fog rolls in."));
    harness.engine.submit_choice("").await;

    let resumed = harness.engine.select_credential_and_resume().await;

    assert_eq!(resumed, Some(ImageOutcome::Deferred(DeferReason::GateClosed)));
    assert!(harness.engine.has_pending_image());
    assert_eq!(harness.image_calls(), 0);
}

#[tokio::test]
async fn test_invalid_key_during_turn_defers() {
    let harness = TestHarness::new();
    harness.illustrator.push_result(Err(invalid_key_error()));
    harness.expect_turn(TurnScript::new("Canyon", "Red walls rise.").image_prompt("a red canyon"));

    let outcome = harness.engine.submit_choice("").await;
    assert!(matches!(
        outcome,
        TurnOutcome::Advanced {
            image: ImageOutcome::Deferred(DeferReason::CredentialInvalid)
        }
    ));
    assert_eq!(harness.engine.pending_image().unwrap().prompt, "a red canyon");

    let resumed = harness.engine.select_credential_and_resume().await;
    assert!(matches!(resumed, Some(ImageOutcome::Generated(_))));

    let calls = harness.illustrator.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].prompt, "a red canyon");
}

#[tokio::test]
async fn test_transient_image_failure_keeps_turn() {
    let harness = TestHarness::new();
    harness
        .illustrator
        .push_result(Err(ProviderError::Api {
            status: 503,
            message: "The model is overloaded.".to_string(),
        }));
    harness.expect_turn(TurnScript::new("Orchard", "Apples, silver-skinned."));

    let outcome = harness.engine.submit_choice("").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Advanced {
            image: ImageOutcome::Failed(ProviderError::Api { status: 503, .. })
        }
    ));
    assert_eq!(harness.engine.snapshot().scene_title, "Orchard");
    assert!(!harness.engine.has_pending_image());
    assert_eq!(harness.engine.phase(), TurnPhase::TurnComplete);
}

#[tokio::test]
async fn test_missing_image_keeps_previous_picture() {
    let harness = TestHarness::new();
    harness
        .expect_turn(TurnScript::new("First", "Morning."))
        .expect_turn(TurnScript::new("Second", "Noon."));

    harness.engine.submit_choice("").await;
    harness.illustrator.push_result(Ok(None));
    let outcome = harness.engine.submit_choice("Wait").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Advanced {
            image: ImageOutcome::Empty
        }
    ));
    assert_eq!(harness.engine.snapshot().current_image, Some(numbered_image(1)));
}

#[tokio::test]
async fn test_later_deferral_replaces_stash() {
    let harness = TestHarness::gated();
    harness
        .expect_turn(TurnScript::new("Dock", "Ropes creak.").image_prompt("first"))
        .expect_turn(TurnScript::new("Ship", "Sails fill.").image_prompt("second"));

    harness.engine.submit_choice("").await;
    harness.engine.submit_choice("Board").await;
    harness.engine.select_credential_and_resume().await;

    let calls = harness.illustrator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "second");
}

#[tokio::test]
async fn test_selected_size_applies_to_next_turn() {
    let harness = TestHarness::new();
    harness.expect_turn(TurnScript::new("Peak", "Thin air."));

    harness.engine.set_image_size(ImageSize::Size2K);
    harness.engine.submit_choice("").await;

    assert_eq!(harness.illustrator.calls()[0].size, ImageSize::Size2K);
}

#[tokio::test]
async fn test_newer_picture_supersedes_stash() {
    let harness = TestHarness::gated();
    harness
        .expect_turn(TurnScript::new("Dock", "Ropes creak.").image_prompt("old dock"))
        .expect_turn(TurnScript::new("Ship", "Sails fill.").image_prompt("new ship"));

    harness.engine.submit_choice("").await;
    assert!(harness.engine.has_pending_image());

    harness.credentials.set(true);
    harness.engine.submit_choice("Board").await;

    assert!(!harness.engine.has_pending_image());
    assert!(harness.engine.resume_image().await.is_none());

    let calls = harness.illustrator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "new ship");
    assert_eq!(harness.engine.snapshot().current_image, Some(numbered_image(1)));
}

#[tokio::test]
async fn test_resume_waits_for_running_turn() {
    let release = Arc::new(Notify::new());
    let harness = TestHarness::with_parts(
        ScriptedNarrator::new(),
        RecordingIllustrator::held(release.clone()),
        ToggleCredentials::new(false),
        EngineConfig::default(),
    );
    harness
        .expect_turn(TurnScript::new("Dock", "Ropes creak.").image_prompt("old dock"))
        .expect_turn(TurnScript::new("Ship", "Sails fill.").image_prompt("new ship"));
    harness.engine.submit_choice("").await;
    harness.credentials.set(true);

    let (turn, _) = tokio::join!(harness.engine.submit_choice("Board"), async {
        while harness.engine.phase() != TurnPhase::AwaitingImage {
            tokio::task::yield_now().await;
        }

        assert!(harness.engine.resume_image().await.is_none());
        assert!(harness.engine.has_pending_image());

        release.notify_one();
    });

    assert!(matches!(turn, TurnOutcome::Advanced { .. }));
    assert_eq!(harness.image_calls(), 1);
    assert_eq!(harness.illustrator.calls()[0].prompt, "new ship");
    assert!(!harness.engine.has_pending_image());
    assert_eq!(harness.engine.phase(), TurnPhase::TurnComplete);
}

#[tokio::test]
async fn test_resume_that_defers_again_blocks_phase() {
    let harness = TestHarness::gated();
    harness.expect_turn(TurnScript::new("Moor", "Fog rolls in."));
    harness.engine.submit_choice("").await;

    let mut phases = harness.engine.subscribe();
    phases.borrow_and_update();
    let resumed = harness.engine.resume_image().await;

    assert_eq!(resumed, Some(ImageOutcome::Deferred(DeferReason::GateClosed)));
    assert!(phases.has_changed().unwrap());
    assert_eq!(harness.engine.phase(), TurnPhase::TurnComplete);
    assert!(harness.engine.has_pending_image());
}
