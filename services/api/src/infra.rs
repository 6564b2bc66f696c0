use async_trait::async_trait;
use chrono::Utc;
use codekids::workflows::registration::{
    deliver, BackendError, NotificationChannel, RegistrationBackend, RegistrationId,
    RegistrationRow, RegistrationStatus, StoredRegistration,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local stand-in for the hosted registrations table and its functions.
#[derive(Default)]
pub(crate) struct InMemoryRegistrationBackend {
    rows: Mutex<Vec<StoredRegistration>>,
    sequence: AtomicU64,
    offline_channels: HashSet<NotificationChannel>,
}

impl InMemoryRegistrationBackend {
    /// Make a channel's function fail on every call.
    pub(crate) fn with_offline_channel(mut self, channel: NotificationChannel) -> Self {
        self.offline_channels.insert(channel);
        self
    }

    pub(crate) fn registrations(&self) -> Vec<StoredRegistration> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_id(&self) -> RegistrationId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        RegistrationId(format!("reg-{id:06}"))
    }
}

#[async_trait]
impl RegistrationBackend for InMemoryRegistrationBackend {
    async fn insert(&self, row: RegistrationRow) -> Result<(), BackendError> {
        let stored = StoredRegistration::pending(self.next_id(), row, Utc::now());
        debug!(id = %stored.id.0, "registration row inserted");
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stored);
        Ok(())
    }

    async fn update_status(
        &self,
        email: &str,
        status: RegistrationStatus,
    ) -> Result<u64, BackendError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matched = 0;
        for stored in rows.iter_mut().filter(|stored| stored.row.email == email) {
            stored.status = stored.status.advance(status);
            matched += 1;
        }
        Ok(matched)
    }

    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, BackendError> {
        let failure = |message: String| BackendError::Function {
            function: function.to_string(),
            message,
        };

        if let Some(channel) = NotificationChannel::from_function_name(function) {
            if self.offline_channels.contains(&channel) {
                return Err(failure(format!("{channel} provider is offline")));
            }
        }

        let receipt = deliver(function, payload).map_err(|err| failure(err.to_string()))?;
        serde_json::to_value(receipt).map_err(|err| failure(err.to_string()))
    }
}
