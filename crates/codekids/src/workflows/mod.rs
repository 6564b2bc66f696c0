pub mod registration;

pub use registration::{
    registration_router, RegistrationBackend, RegistrationForm, RegistrationService,
    SubmissionOrchestrator, VerificationHandler,
};
