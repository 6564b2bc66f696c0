//! Code Kids registration: validate the form, persist it, send confirmations,
//! and verify the parent's email address afterwards.

pub mod backend;
pub mod domain;
pub mod feedback;
pub mod notify;
pub mod orchestrator;
pub mod router;
pub mod service;
pub mod tokens;
pub mod validation;
pub mod verification;

#[cfg(test)]
mod tests;

pub use backend::{BackendError, RegistrationBackend};
pub use domain::{
    parse_leading_int, RegistrationForm, RegistrationId, RegistrationRow, RegistrationStatus,
    SkillLevel, StoredRegistration, ValidatedRegistration,
};
pub use feedback::{Feedback, FeedbackLevel, FeedbackLog, FeedbackSink};
pub use notify::{
    deliver, DeliveryError, DeliveryReceipt, Notification, NotificationChannel, RenderedMessage,
};
pub use orchestrator::{
    NotificationOutcome, SessionSnapshot, SubmissionError, SubmissionOrchestrator,
    SubmissionReceipt, SubmissionState,
};
pub use router::registration_router;
pub use service::RegistrationService;
pub use tokens::{TokenError, VerificationClaims, VerificationTokens};
pub use validation::{validate, FieldErrors, FormField};
pub use verification::{VerificationHandler, VerificationOutcome};
