use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;

use crate::config::{RegistrationConfig, VerificationConfig, VerificationMode};
use crate::workflows::registration::backend::{BackendError, RegistrationBackend};
use crate::workflows::registration::domain::{
    RegistrationForm, RegistrationRow, RegistrationStatus, ValidatedRegistration,
};
use crate::workflows::registration::feedback::FeedbackLog;
use crate::workflows::registration::notify::deliver;
use crate::workflows::registration::orchestrator::SubmissionOrchestrator;
use crate::workflows::registration::service::RegistrationService;
use crate::workflows::registration::validation::validate;

pub(super) const RESET_WINDOW: Duration = Duration::from_millis(3000);
pub(super) const TEST_SECRET: &str = "registration-test-secret";

pub(super) fn valid_form() -> RegistrationForm {
    RegistrationForm {
        child_first_name: "Ada".to_string(),
        child_last_name: "Lovelace".to_string(),
        child_age: "9".to_string(),
        parent_name: "Anne Byron".to_string(),
        email: "anne@example.com".to_string(),
        phone: "5155550100".to_string(),
        skill_level: Some("intermediate".to_string()),
        additional_info: Some("Loves puzzles".to_string()),
    }
}

pub(super) fn registration() -> ValidatedRegistration {
    validate(&valid_form()).expect("fixture form is valid")
}

pub(super) fn orchestrator(
    backend: Arc<FakeBackend>,
    feedback: &FeedbackLog,
) -> SubmissionOrchestrator<FakeBackend> {
    SubmissionOrchestrator::new(backend, Arc::new(feedback.clone()), RESET_WINDOW)
}

pub(super) fn registration_config(mode: VerificationMode) -> RegistrationConfig {
    RegistrationConfig {
        success_display: RESET_WINDOW,
        verification: VerificationConfig {
            mode,
            secret: TEST_SECRET.to_string(),
            token_ttl: chrono::Duration::hours(72),
            public_url: "https://codekids.example".to_string(),
        },
    }
}

pub(super) fn build_service(
    backend: FakeBackend,
    mode: VerificationMode,
) -> (Arc<RegistrationService<FakeBackend>>, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let service = RegistrationService::new(backend.clone(), registration_config(mode));
    (Arc::new(service), backend)
}

/// Scriptable backend that records every call it receives.
#[derive(Default)]
pub(super) struct FakeBackend {
    inserts: Mutex<Vec<RegistrationRow>>,
    invocations: Mutex<Vec<(String, Value)>>,
    status_updates: Mutex<Vec<(String, RegistrationStatus)>>,
    insert_failure: Option<BackendError>,
    update_failure: Option<BackendError>,
    failing_functions: HashSet<String>,
    insert_gate: Option<Arc<Notify>>,
}

impl FakeBackend {
    pub(super) fn failing_insert(mut self, error: BackendError) -> Self {
        self.insert_failure = Some(error);
        self
    }

    pub(super) fn failing_update(mut self, error: BackendError) -> Self {
        self.update_failure = Some(error);
        self
    }

    pub(super) fn failing_function(mut self, function: &str) -> Self {
        self.failing_functions.insert(function.to_string());
        self
    }

    /// Hold every insert until the gate is notified.
    pub(super) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.insert_gate = Some(gate);
        self
    }

    pub(super) fn inserts(&self) -> Vec<RegistrationRow> {
        self.inserts.lock().expect("insert log poisoned").clone()
    }

    pub(super) fn invoked_functions(&self) -> Vec<String> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .iter()
            .map(|(function, _)| function.clone())
            .collect()
    }

    pub(super) fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .clone()
    }

    pub(super) fn status_updates(&self) -> Vec<(String, RegistrationStatus)> {
        self.status_updates
            .lock()
            .expect("status log poisoned")
            .clone()
    }
}

#[async_trait]
impl RegistrationBackend for FakeBackend {
    async fn insert(&self, row: RegistrationRow) -> Result<(), BackendError> {
        if let Some(gate) = &self.insert_gate {
            gate.notified().await;
        }
        self.inserts.lock().expect("insert log poisoned").push(row);
        match &self.insert_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn update_status(
        &self,
        email: &str,
        status: RegistrationStatus,
    ) -> Result<u64, BackendError> {
        self.status_updates
            .lock()
            .expect("status log poisoned")
            .push((email.to_string(), status));
        if let Some(error) = &self.update_failure {
            return Err(error.clone());
        }
        let matched = self
            .inserts()
            .iter()
            .filter(|row| row.email == email)
            .count();
        Ok(matched as u64)
    }

    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, BackendError> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .push((function.to_string(), payload.clone()));
        if self.failing_functions.contains(function) {
            return Err(BackendError::Function {
                function: function.to_string(),
                message: "provider timeout".to_string(),
            });
        }
        let receipt = deliver(function, payload).map_err(|err| BackendError::Function {
            function: function.to_string(),
            message: err.to_string(),
        })?;
        serde_json::to_value(receipt).map_err(|err| BackendError::Function {
            function: function.to_string(),
            message: err.to_string(),
        })
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
