use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::backend::RegistrationBackend;
use super::domain::RegistrationStatus;
use super::feedback::{Feedback, FeedbackSink};
use super::tokens::VerificationTokens;

pub const INVALID_LINK_MESSAGE: &str = "Invalid verification link";
pub const VERIFIED_MESSAGE: &str = "Email verified successfully!";
pub const VERIFY_FAILED_MESSAGE: &str = "Failed to verify email. Please try again.";

/// Terminal result of a verification attempt. There is no in-progress variant:
/// once `verify` returns, verifying is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified { matched: u64 },
    InvalidLink,
    Failed { message: String },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified { .. } => VERIFIED_MESSAGE,
            VerificationOutcome::InvalidLink => INVALID_LINK_MESSAGE,
            VerificationOutcome::Failed { .. } => VERIFY_FAILED_MESSAGE,
        }
    }
}

/// Marks registrations verified from a confirmation link.
pub struct VerificationHandler<B> {
    backend: Arc<B>,
    feedback: Arc<dyn FeedbackSink>,
    tokens: Option<Arc<VerificationTokens>>,
}

impl<B> VerificationHandler<B>
where
    B: RegistrationBackend + 'static,
{
    pub fn new(backend: Arc<B>, feedback: Arc<dyn FeedbackSink>) -> Self {
        Self {
            backend,
            feedback,
            tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<VerificationTokens>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Flip every registration for `email` to verified.
    ///
    /// A missing or empty email is reported as an invalid link without touching
    /// the backend. Safe to repeat: the status only ever moves to verified.
    pub async fn verify(&self, email: Option<&str>) -> VerificationOutcome {
        let Some(email) = email.filter(|email| !email.is_empty()) else {
            return self.finish(VerificationOutcome::InvalidLink);
        };

        let outcome = match self
            .backend
            .update_status(email, RegistrationStatus::Verified)
            .await
        {
            Ok(matched) => {
                info!(matched, "registration email verified");
                VerificationOutcome::Verified { matched }
            }
            Err(err) => {
                warn!(error = %err, "verification update failed");
                VerificationOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };

        self.finish(outcome)
    }

    /// Redeem a signed link. The token is spent only if verification succeeds.
    pub async fn verify_token(&self, token: Option<&str>) -> VerificationOutcome {
        let Some(tokens) = self.tokens.as_ref() else {
            warn!("token verification requested but no token issuer is configured");
            return self.finish(VerificationOutcome::InvalidLink);
        };
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            return self.finish(VerificationOutcome::InvalidLink);
        };

        let claims = match tokens.decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(error = %err, "rejected verification token");
                return self.finish(VerificationOutcome::InvalidLink);
            }
        };
        if let Err(err) = tokens.claim(&claims.jti, claims.exp) {
            warn!(error = %err, "rejected verification token");
            return self.finish(VerificationOutcome::InvalidLink);
        }

        let outcome = self.verify(Some(&claims.sub)).await;
        if !outcome.is_verified() {
            tokens.release(&claims.jti);
        }
        outcome
    }

    fn finish(&self, outcome: VerificationOutcome) -> VerificationOutcome {
        let feedback = if outcome.is_verified() {
            Feedback::success(outcome.message())
        } else {
            Feedback::error(outcome.message())
        };
        self.feedback.publish(feedback);
        outcome
    }
}
