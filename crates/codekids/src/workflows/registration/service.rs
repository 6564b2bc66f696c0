use std::sync::Arc;

use crate::config::{RegistrationConfig, VerificationMode};

use super::backend::RegistrationBackend;
use super::feedback::FeedbackSink;
use super::orchestrator::SubmissionOrchestrator;
use super::tokens::VerificationTokens;
use super::verification::VerificationHandler;

/// Shared collaborators for the registration workflow.
///
/// Orchestrators carry per-form session state, so the service hands out a
/// fresh one per submission rather than holding one itself.
pub struct RegistrationService<B> {
    backend: Arc<B>,
    config: RegistrationConfig,
    tokens: Arc<VerificationTokens>,
}

impl<B> RegistrationService<B>
where
    B: RegistrationBackend + 'static,
{
    pub fn new(backend: Arc<B>, config: RegistrationConfig) -> Self {
        let tokens = Arc::new(VerificationTokens::from_config(&config.verification));
        Self {
            backend,
            config,
            tokens,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<VerificationTokens> {
        &self.tokens
    }

    pub fn verification_mode(&self) -> VerificationMode {
        self.config.verification.mode
    }

    pub fn orchestrator(&self, feedback: Arc<dyn FeedbackSink>) -> SubmissionOrchestrator<B> {
        let orchestrator = SubmissionOrchestrator::new(
            Arc::clone(&self.backend),
            feedback,
            self.config.success_display,
        );
        match self.verification_mode() {
            VerificationMode::SignedToken => {
                orchestrator.with_verification_links(Arc::clone(&self.tokens))
            }
            VerificationMode::EmailLink => orchestrator,
        }
    }

    pub fn verifier(&self, feedback: Arc<dyn FeedbackSink>) -> VerificationHandler<B> {
        VerificationHandler::new(Arc::clone(&self.backend), feedback)
            .with_tokens(Arc::clone(&self.tokens))
    }
}
