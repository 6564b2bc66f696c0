use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::VerificationMode;

use super::backend::RegistrationBackend;
use super::domain::RegistrationForm;
use super::feedback::FeedbackLog;
use super::notify::{deliver, NotificationChannel};
use super::orchestrator::SubmissionError;
use super::service::RegistrationService;
use super::validation::validate;
use super::verification::VerificationOutcome;

/// Router exposing submission, verification and the notification functions.
pub fn registration_router<B>(service: Arc<RegistrationService<B>>) -> Router
where
    B: RegistrationBackend + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(submit_handler::<B>))
        .route("/api/v1/registrations/verify", get(verify_handler::<B>))
        .route("/api/v1/functions/:name", post(function_handler))
        .with_state(service)
}

pub(crate) async fn submit_handler<B>(
    State(service): State<Arc<RegistrationService<B>>>,
    axum::Json(form): axum::Json<RegistrationForm>,
) -> Response
where
    B: RegistrationBackend + 'static,
{
    let registration = match validate(&form) {
        Ok(registration) => registration,
        Err(errors) => {
            let payload = json!({ "errors": errors });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    let feedback = FeedbackLog::default();
    let orchestrator = service.orchestrator(Arc::new(feedback.clone()));

    match orchestrator.submit(registration).await {
        Ok(receipt) => {
            let payload = json!({
                "state": receipt.state,
                "notifications": receipt.notifications,
                "feedback": feedback.events(),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(SubmissionError::Persistence { message, .. }) => {
            let payload = json!({
                "error": message,
                "feedback": feedback.events(),
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
        Err(err @ SubmissionError::InFlight) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VerifyParams {
    token: Option<String>,
    email: Option<String>,
}

pub(crate) async fn verify_handler<B>(
    State(service): State<Arc<RegistrationService<B>>>,
    Query(params): Query<VerifyParams>,
) -> Response
where
    B: RegistrationBackend + 'static,
{
    let feedback = FeedbackLog::default();
    let verifier = service.verifier(Arc::new(feedback.clone()));

    let outcome = match (params.token.as_deref(), service.verification_mode()) {
        (Some(token), _) => verifier.verify_token(Some(token)).await,
        (None, VerificationMode::EmailLink) => verifier.verify(params.email.as_deref()).await,
        (None, VerificationMode::SignedToken) => verifier.verify(None).await,
    };

    let status = match &outcome {
        VerificationOutcome::Verified { .. } => StatusCode::OK,
        VerificationOutcome::InvalidLink => StatusCode::BAD_REQUEST,
        VerificationOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
    };
    let payload = json!({
        "done": true,
        "verified": outcome.is_verified(),
        "message": outcome.message(),
        "result": outcome,
        "feedback": feedback.events(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn function_handler(
    Path(name): Path<String>,
    axum::Json(payload): axum::Json<Value>,
) -> Response {
    if NotificationChannel::from_function_name(&name).is_none() {
        let payload = json!({ "error": format!("unknown function '{name}'") });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    }

    match deliver(&name, payload) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
    }
}
