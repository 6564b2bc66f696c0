use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Success,
    Warning,
    Error,
}

/// A transient notice shown to the person filling in the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
}

impl Feedback {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Error,
            message: message.into(),
        }
    }
}

/// Where orchestrators and verifiers send user-facing notices.
pub trait FeedbackSink: Send + Sync {
    fn publish(&self, feedback: Feedback);
}

/// Sink that keeps every notice in memory, in publish order.
#[derive(Debug, Default, Clone)]
pub struct FeedbackLog {
    events: Arc<Mutex<Vec<Feedback>>>,
}

impl FeedbackLog {
    pub fn events(&self) -> Vec<Feedback> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, level: FeedbackLevel) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.level == level)
            .count()
    }
}

impl FeedbackSink for FeedbackLog {
    fn publish(&self, feedback: Feedback) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(feedback);
    }
}
