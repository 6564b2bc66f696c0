use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::common::*;
use crate::workflows::registration::backend::BackendError;
use crate::workflows::registration::domain::RegistrationForm;
use crate::workflows::registration::feedback::{Feedback, FeedbackLevel, FeedbackLog};
use crate::workflows::registration::notify::{EMAIL_FUNCTION, SMS_FUNCTION};
use crate::workflows::registration::orchestrator::{
    SubmissionError, SubmissionState, NOTIFICATION_DELAY_WARNING, SUBMIT_FAILURE_MESSAGE,
    SUBMIT_FALLBACK_ERROR, SUBMIT_INTERRUPTED_ERROR, SUBMIT_SUCCESS_MESSAGE,
};
use crate::workflows::registration::tokens::VerificationTokens;

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn successful_submission_notifies_and_resets_after_display_window() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    let receipt = orchestrator
        .submit(registration())
        .await
        .expect("submission succeeds");

    assert_eq!(receipt.state, SubmissionState::Success);
    assert!(receipt.notifications_delivered());
    assert_eq!(backend.inserts(), vec![registration().to_row()]);
    assert_eq!(
        backend.invoked_functions(),
        vec![EMAIL_FUNCTION.to_string(), SMS_FUNCTION.to_string()]
    );
    assert_eq!(
        feedback.events(),
        vec![Feedback::success(SUBMIT_SUCCESS_MESSAGE)]
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SubmissionState::Success);
    assert_eq!(snapshot.draft, valid_form());

    advance(2999).await;
    assert_eq!(orchestrator.state(), SubmissionState::Success);

    advance(2).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SubmissionState::Idle);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.draft, RegistrationForm::default());
}

#[tokio::test(start_paused = true)]
async fn email_failure_still_succeeds_with_a_warning() {
    let backend = Arc::new(FakeBackend::default().failing_function(EMAIL_FUNCTION));
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    let receipt = orchestrator
        .submit(registration())
        .await
        .expect("notification failures are not fatal");

    assert_eq!(receipt.state, SubmissionState::Success);
    assert_eq!(orchestrator.state(), SubmissionState::Success);
    assert_eq!(
        backend.invoked_functions(),
        vec![EMAIL_FUNCTION.to_string(), SMS_FUNCTION.to_string()]
    );

    let email = &receipt.notifications[0];
    assert!(!email.delivered);
    assert!(email.error.as_deref().unwrap_or_default().contains("provider timeout"));
    assert!(receipt.notifications[1].delivered);

    assert_eq!(
        feedback.events(),
        vec![
            Feedback::warning(NOTIFICATION_DELAY_WARNING),
            Feedback::success(SUBMIT_SUCCESS_MESSAGE),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn both_notifications_failing_emit_a_single_warning() {
    let backend = Arc::new(
        FakeBackend::default()
            .failing_function(EMAIL_FUNCTION)
            .failing_function(SMS_FUNCTION),
    );
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    let receipt = orchestrator
        .submit(registration())
        .await
        .expect("still a success");

    assert_eq!(receipt.state, SubmissionState::Success);
    assert!(receipt.notifications.iter().all(|outcome| !outcome.delivered));
    assert_eq!(feedback.count(FeedbackLevel::Warning), 1);
    assert_eq!(feedback.count(FeedbackLevel::Success), 1);
    assert_eq!(feedback.count(FeedbackLevel::Error), 0);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_skips_notifications() {
    let backend =
        Arc::new(FakeBackend::default().failing_insert(BackendError::rejected("duplicate email")));
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    let err = orchestrator
        .submit(registration())
        .await
        .expect_err("insert failure is fatal");

    match err {
        SubmissionError::Persistence { message, source } => {
            assert_eq!(message, "duplicate email");
            assert_eq!(source, BackendError::rejected("duplicate email"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SubmissionState::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("duplicate email"));
    assert!(backend.invoked_functions().is_empty());
    assert_eq!(
        feedback.events(),
        vec![Feedback::error(SUBMIT_FAILURE_MESSAGE)]
    );

    advance(5000).await;
    assert_eq!(orchestrator.state(), SubmissionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn blank_backend_message_falls_back_to_generic_error() {
    let backend = Arc::new(FakeBackend::default().failing_insert(BackendError::rejected("  ")));
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend, &feedback);

    let _ = orchestrator.submit(registration()).await;

    assert_eq!(
        orchestrator.snapshot().error.as_deref(),
        Some(SUBMIT_FALLBACK_ERROR)
    );
}

#[tokio::test]
async fn second_submit_while_in_flight_is_rejected() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(FakeBackend::default().gated(gate.clone()));
    let feedback = FeedbackLog::default();
    let orchestrator = Arc::new(orchestrator(backend.clone(), &feedback));

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit(registration()).await }
    });
    while orchestrator.state() != SubmissionState::Submitting {
        tokio::task::yield_now().await;
    }

    let second = orchestrator.submit(registration()).await;
    assert!(matches!(second, Err(SubmissionError::InFlight)));

    gate.notify_one();
    let receipt = first
        .await
        .expect("task joins")
        .expect("first submission succeeds");

    assert_eq!(receipt.state, SubmissionState::Success);
    assert_eq!(backend.inserts().len(), 1);
    assert_eq!(feedback.count(FeedbackLevel::Success), 1);
    orchestrator.cancel_pending_reset();
}

#[tokio::test(start_paused = true)]
async fn stale_timer_does_not_reset_a_newer_submission() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    orchestrator.submit(registration()).await.expect("first");
    advance(2000).await;

    orchestrator.reset();
    assert_eq!(orchestrator.state(), SubmissionState::Idle);

    orchestrator.submit(registration()).await.expect("second");

    // First timer would have fired at 3000ms.
    advance(1500).await;
    assert_eq!(orchestrator.state(), SubmissionState::Success);

    advance(1501).await;
    assert_eq!(orchestrator.state(), SubmissionState::Idle);
    assert_eq!(backend.inserts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn timer_from_an_earlier_generation_fires_without_resetting() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend, &feedback);

    orchestrator.submit(registration()).await.expect("first");
    orchestrator.detach_pending_reset();
    advance(2000).await;

    orchestrator.reset();
    orchestrator.submit(registration()).await.expect("second");

    // Detached first timer fires at 3000ms against the second generation.
    advance(1500).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SubmissionState::Success);
    assert_eq!(snapshot.draft, valid_form());

    advance(1501).await;
    assert_eq!(orchestrator.state(), SubmissionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn dropped_submission_does_not_wedge_the_session() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(FakeBackend::default().gated(gate.clone()));
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend.clone(), &feedback);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), orchestrator.submit(registration())).await;
    assert!(abandoned.is_err());

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SubmissionState::Failed);
    assert_eq!(snapshot.error.as_deref(), Some(SUBMIT_INTERRUPTED_ERROR));

    orchestrator.reset();
    assert_eq!(orchestrator.state(), SubmissionState::Idle);

    gate.notify_one();
    let receipt = orchestrator
        .submit(registration())
        .await
        .expect("resubmission is accepted");
    assert_eq!(receipt.state, SubmissionState::Success);
    assert_eq!(backend.inserts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resubmitting_restarts_the_display_window() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend, &feedback);

    orchestrator.submit(registration()).await.expect("first");
    advance(2500).await;
    orchestrator.submit(registration()).await.expect("second");

    advance(1000).await;
    assert_eq!(orchestrator.state(), SubmissionState::Success);

    advance(2001).await;
    assert_eq!(orchestrator.state(), SubmissionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancelled_reset_keeps_the_confirmation_visible() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend, &feedback);

    orchestrator.submit(registration()).await.expect("submits");
    orchestrator.cancel_pending_reset();

    advance(10_000).await;
    assert_eq!(orchestrator.state(), SubmissionState::Success);
}

#[tokio::test(start_paused = true)]
async fn edits_replace_the_draft_outside_of_submission() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let orchestrator = orchestrator(backend, &feedback);

    let mut draft = RegistrationForm::default();
    draft.child_first_name = "Gr".to_string();
    orchestrator.edit(draft.clone());
    assert_eq!(orchestrator.snapshot().draft, draft);

    orchestrator.reset();
    assert_eq!(orchestrator.snapshot().draft, RegistrationForm::default());
}

#[tokio::test(start_paused = true)]
async fn verification_link_is_embedded_in_the_email_payload() {
    let backend = Arc::new(FakeBackend::default());
    let feedback = FeedbackLog::default();
    let tokens = Arc::new(VerificationTokens::new(
        TEST_SECRET,
        chrono::Duration::hours(1),
        "https://codekids.example",
    ));
    let orchestrator = orchestrator(backend.clone(), &feedback).with_verification_links(tokens);

    orchestrator.submit(registration()).await.expect("submits");

    let invocations = backend.invocations();
    let (function, payload) = &invocations[0];
    assert_eq!(function, EMAIL_FUNCTION);
    assert_eq!(payload["email"], "anne@example.com");
    assert_eq!(payload["parentName"], "Anne Byron");
    let url = payload["verificationUrl"].as_str().expect("link present");
    assert!(url.starts_with("https://codekids.example/api/v1/registrations/verify?token="));

    let (function, payload) = &invocations[1];
    assert_eq!(function, SMS_FUNCTION);
    assert_eq!(
        payload,
        &serde_json::json!({ "phone": "5155550100", "parentName": "Anne Byron" })
    );
}
