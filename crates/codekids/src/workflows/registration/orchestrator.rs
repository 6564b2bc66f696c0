use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::backend::{BackendError, RegistrationBackend};
use super::domain::{RegistrationForm, ValidatedRegistration};
use super::feedback::{Feedback, FeedbackSink};
use super::notify::{Notification, NotificationChannel};
use super::tokens::VerificationTokens;

pub const SUBMIT_SUCCESS_MESSAGE: &str = "Registration submitted successfully!";
pub const SUBMIT_FAILURE_MESSAGE: &str = "Registration failed. Please try again.";
pub const SUBMIT_FALLBACK_ERROR: &str = "Failed to submit registration. Please try again.";
pub const SUBMIT_INTERRUPTED_ERROR: &str = "Submission was interrupted. Please try again.";
pub const NOTIFICATION_DELAY_WARNING: &str =
    "Registration saved but notification delivery may be delayed";

/// Where the form currently is in its submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Success,
    Failed,
}

/// Point-in-time copy of the form session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SubmissionState,
    pub error: Option<String>,
    pub draft: RegistrationForm,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub channel: NotificationChannel,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a successful submission reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub state: SubmissionState,
    pub notifications: Vec<NotificationOutcome>,
}

impl SubmissionReceipt {
    pub fn notifications_delivered(&self) -> bool {
        self.notifications.iter().all(|outcome| outcome.delivered)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("a submission is already in progress")]
    InFlight,
    #[error("{message}")]
    Persistence {
        message: String,
        #[source]
        source: BackendError,
    },
}

struct FormSession {
    state: SubmissionState,
    error: Option<String>,
    draft: RegistrationForm,
    generation: u64,
    pending_reset: Option<AbortHandle>,
}

impl FormSession {
    fn new() -> Self {
        Self {
            state: SubmissionState::Idle,
            error: None,
            draft: RegistrationForm::default(),
            generation: 0,
            pending_reset: None,
        }
    }

    fn cancel_reset(&mut self) {
        if let Some(handle) = self.pending_reset.take() {
            handle.abort();
        }
    }

    fn clear(&mut self) {
        self.state = SubmissionState::Idle;
        self.error = None;
        self.draft = RegistrationForm::default();
    }
}

/// Marks a session as `Submitting` for one generation.
///
/// If the owning `submit` future is dropped before reaching a terminal state,
/// the session is moved to `Failed` so it can be reset or resubmitted.
struct SubmitGuard<'a> {
    session: &'a Mutex<FormSession>,
    generation: u64,
    armed: bool,
}

impl SubmitGuard<'_> {
    fn lock(&self) -> MutexGuard<'_, FormSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter a terminal state; the guard no longer needs to unwind.
    fn settle(mut self, state: SubmissionState, error: Option<String>) {
        self.armed = false;
        let mut session = self.lock();
        session.state = state;
        session.error = error;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = self.lock();
        if session.generation == self.generation && session.state == SubmissionState::Submitting {
            warn!(generation = self.generation, "submission dropped before completing");
            session.state = SubmissionState::Failed;
            session.error = Some(SUBMIT_INTERRUPTED_ERROR.to_string());
        }
    }
}

/// Drives one registration form through persist-then-notify.
///
/// Holds a single form session: one submission at a time, a second `submit`
/// while one is in flight is refused. After a successful submission the
/// session returns to `Idle` with a blank draft once the display window passes.
pub struct SubmissionOrchestrator<B> {
    backend: Arc<B>,
    feedback: Arc<dyn FeedbackSink>,
    tokens: Option<Arc<VerificationTokens>>,
    success_display: Duration,
    session: Arc<Mutex<FormSession>>,
}

impl<B> SubmissionOrchestrator<B>
where
    B: RegistrationBackend + 'static,
{
    pub fn new(backend: Arc<B>, feedback: Arc<dyn FeedbackSink>, success_display: Duration) -> Self {
        Self {
            backend,
            feedback,
            tokens: None,
            success_display,
            session: Arc::new(Mutex::new(FormSession::new())),
        }
    }

    /// Embed a signed verification link in the confirmation email.
    pub fn with_verification_links(mut self, tokens: Arc<VerificationTokens>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock_session();
        SessionSnapshot {
            state: session.state,
            error: session.error.clone(),
            draft: session.draft.clone(),
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.lock_session().state
    }

    /// Replace the draft being edited. Ignored while a submission is in flight.
    pub fn edit(&self, draft: RegistrationForm) {
        let mut session = self.lock_session();
        if session.state != SubmissionState::Submitting {
            session.draft = draft;
        }
    }

    /// Blank the form immediately, dropping any scheduled reset.
    pub fn reset(&self) {
        let mut session = self.lock_session();
        if session.state == SubmissionState::Submitting {
            return;
        }
        session.cancel_reset();
        session.generation += 1;
        session.clear();
    }

    pub fn cancel_pending_reset(&self) {
        self.lock_session().cancel_reset();
    }

    /// Persist a validated registration, then send both confirmations.
    ///
    /// Persistence failure ends the attempt in `Failed` and skips notifications.
    /// Notification failures are logged and reported, never fatal.
    pub async fn submit(
        &self,
        registration: ValidatedRegistration,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let guard = self.begin(&registration)?;
        let generation = guard.generation;

        if let Err(source) = self.backend.insert(registration.to_row()).await {
            let message = source
                .user_message()
                .unwrap_or(SUBMIT_FALLBACK_ERROR)
                .to_string();
            error!(error = %source, "registration insert failed");
            guard.settle(SubmissionState::Failed, Some(message.clone()));
            self.feedback.publish(Feedback::error(SUBMIT_FAILURE_MESSAGE));
            return Err(SubmissionError::Persistence { message, source });
        }
        info!(skill_level = %registration.skill_level(), "registration stored");

        let notifications = self.send_confirmations(&registration).await;
        if notifications.iter().any(|outcome| !outcome.delivered) {
            self.feedback
                .publish(Feedback::warning(NOTIFICATION_DELAY_WARNING));
        }

        guard.settle(SubmissionState::Success, None);
        self.feedback.publish(Feedback::success(SUBMIT_SUCCESS_MESSAGE));
        self.schedule_reset(generation);

        Ok(SubmissionReceipt {
            state: SubmissionState::Success,
            notifications,
        })
    }

    fn begin(
        &self,
        registration: &ValidatedRegistration,
    ) -> Result<SubmitGuard<'_>, SubmissionError> {
        let mut session = self.lock_session();
        if session.state == SubmissionState::Submitting {
            return Err(SubmissionError::InFlight);
        }
        session.cancel_reset();
        session.generation += 1;
        session.state = SubmissionState::Submitting;
        session.error = None;
        session.draft = registration.form().clone();
        Ok(SubmitGuard {
            session: &self.session,
            generation: session.generation,
            armed: true,
        })
    }

    async fn send_confirmations(
        &self,
        registration: &ValidatedRegistration,
    ) -> Vec<NotificationOutcome> {
        let verification_url = self.verification_url(registration.email());
        let mut outcomes = Vec::with_capacity(NotificationChannel::ALL.len());

        for channel in NotificationChannel::ALL {
            let notification =
                Notification::for_registration(channel, registration, verification_url.as_deref());
            let result = match notification.payload() {
                Ok(payload) => self
                    .backend
                    .invoke(channel.function_name(), payload)
                    .await
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };

            let outcome = match result {
                Ok(_) => NotificationOutcome {
                    channel,
                    delivered: true,
                    error: None,
                },
                Err(message) => {
                    warn!(%channel, error = %message, "confirmation delivery failed");
                    NotificationOutcome {
                        channel,
                        delivered: false,
                        error: Some(message),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    fn verification_url(&self, email: &str) -> Option<String> {
        let tokens = self.tokens.as_ref()?;
        match tokens.link_for(email) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(error = %err, "unable to issue verification link");
                None
            }
        }
    }

    fn schedule_reset(&self, generation: u64) {
        let session = Arc::clone(&self.session);
        let delay = self.success_display;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            if session.state == SubmissionState::Success && session.generation == generation {
                session.clear();
                session.pending_reset = None;
                debug!(generation, "form reset after confirmation");
            }
        });

        let mut session = self.lock_session();
        session.cancel_reset();
        session.pending_reset = Some(task.abort_handle());
    }

    /// Forget the scheduled reset without aborting it, so it still fires.
    #[cfg(test)]
    pub(crate) fn detach_pending_reset(&self) {
        self.lock_session().pending_reset.take();
    }

    fn lock_session(&self) -> MutexGuard<'_, FormSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
