//! Confirmation notifications.
//!
//! A [`Notification`] is built from a validated registration, serialized into the
//! body of a serverless function call, and on the other side decoded and rendered
//! by [`deliver`]. Delivery is a stub: it renders the message, logs the intent,
//! and reports success with a note that no provider is wired in.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::domain::ValidatedRegistration;

pub const EMAIL_FUNCTION: &str = "send-confirmation-email";
pub const SMS_FUNCTION: &str = "send-confirmation-sms";

const EMAIL_SENDER: &str = "noreply@codekids.com";
const EMAIL_SUBJECT: &str = "Code Kids Registration Confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
}

impl NotificationChannel {
    /// Delivery order used by the orchestrator.
    pub const ALL: [NotificationChannel; 2] = [NotificationChannel::Email, NotificationChannel::Sms];

    pub fn function_name(&self) -> &'static str {
        match self {
            NotificationChannel::Email => EMAIL_FUNCTION,
            NotificationChannel::Sms => SMS_FUNCTION,
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            EMAIL_FUNCTION => Some(NotificationChannel::Email),
            SMS_FUNCTION => Some(NotificationChannel::Sms),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfirmation {
    pub email: String,
    pub parent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConfirmation {
    pub phone: String,
    pub parent_name: String,
}

/// One confirmation message, addressed and ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Email(EmailConfirmation),
    Sms(SmsConfirmation),
}

impl Notification {
    pub fn for_registration(
        channel: NotificationChannel,
        registration: &ValidatedRegistration,
        verification_url: Option<&str>,
    ) -> Self {
        match channel {
            NotificationChannel::Email => Notification::Email(EmailConfirmation {
                email: registration.email().to_string(),
                parent_name: registration.parent_name().to_string(),
                verification_url: verification_url.map(str::to_string),
            }),
            NotificationChannel::Sms => Notification::Sms(SmsConfirmation {
                phone: registration.phone().to_string(),
                parent_name: registration.parent_name().to_string(),
            }),
        }
    }

    pub fn channel(&self) -> NotificationChannel {
        match self {
            Notification::Email(_) => NotificationChannel::Email,
            Notification::Sms(_) => NotificationChannel::Sms,
        }
    }

    /// JSON body for the channel's function.
    pub fn payload(&self) -> Result<Value, DeliveryError> {
        let encoded = match self {
            Notification::Email(email) => serde_json::to_value(email),
            Notification::Sms(sms) => serde_json::to_value(sms),
        };
        encoded.map_err(|source| DeliveryError::MalformedPayload {
            function: self.channel().function_name(),
            source,
        })
    }

    /// Inverse of [`Notification::payload`], keyed by function name.
    pub fn decode(function: &str, payload: Value) -> Result<Self, DeliveryError> {
        let channel = NotificationChannel::from_function_name(function)
            .ok_or_else(|| DeliveryError::UnknownFunction(function.to_string()))?;
        let function = channel.function_name();
        let malformed = |source| DeliveryError::MalformedPayload { function, source };

        match channel {
            NotificationChannel::Email => serde_json::from_value(payload)
                .map(Notification::Email)
                .map_err(malformed),
            NotificationChannel::Sms => serde_json::from_value(payload)
                .map(Notification::Sms)
                .map_err(malformed),
        }
    }

    pub fn render(&self) -> RenderedMessage {
        match self {
            Notification::Email(email) => RenderedMessage::Email {
                to: email.email.clone(),
                from: EMAIL_SENDER.to_string(),
                subject: EMAIL_SUBJECT.to_string(),
                html: render_email_html(email),
            },
            Notification::Sms(sms) => RenderedMessage::Sms {
                to: sms.phone.clone(),
                body: format!(
                    "Hello {}, thank you for registering with Code Kids! Your registration has been received. We'll be in touch soon with more details.",
                    sms.parent_name
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum RenderedMessage {
    Email {
        to: String,
        from: String,
        subject: String,
        html: String,
    },
    Sms {
        to: String,
        body: String,
    },
}

/// Response body of a delivery function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub message: String,
    pub details: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("unknown notification function '{0}'")]
    UnknownFunction(String),
    #[error("malformed payload for {function}: {source}")]
    MalformedPayload {
        function: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Stub body of the two confirmation functions.
pub fn deliver(function: &str, payload: Value) -> Result<DeliveryReceipt, DeliveryError> {
    let notification = Notification::decode(function, payload)?;
    let rendered = notification.render();

    let receipt = match &notification {
        Notification::Email(email) => {
            info!(to = %email.email, parent = %email.parent_name, "sending confirmation email");
            DeliveryReceipt {
                success: true,
                message: "Email confirmation sent successfully".to_string(),
                details: "Stub delivery: configure an email provider to send real messages"
                    .to_string(),
            }
        }
        Notification::Sms(sms) => {
            info!(to = %sms.phone, parent = %sms.parent_name, "sending confirmation sms");
            DeliveryReceipt {
                success: true,
                message: "SMS confirmation sent successfully".to_string(),
                details: "Stub delivery: configure an SMS provider to send real messages"
                    .to_string(),
            }
        }
    };
    debug!(?rendered, "rendered confirmation");

    Ok(receipt)
}

fn render_email_html(email: &EmailConfirmation) -> String {
    let parent = escape_html(&email.parent_name);
    let verification = match &email.verification_url {
        Some(url) => format!(
            "\n  <p>Please confirm your email address: <a href=\"{0}\">{0}</a></p>",
            escape_html(url)
        ),
        None => String::new(),
    };

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #3b82f6;">{EMAIL_SUBJECT}</h2>
  <p>Hello {parent},</p>
  <p>Thank you for registering your child with Code Kids! We've received your registration and are excited to have your child join our program.</p>
  <p>We'll be in touch shortly with next steps and class information.</p>{verification}
  <p>If you have any questions in the meantime, please don't hesitate to reach out.</p>
  <p>Best regards,<br>The Code Kids Team</p>
</div>"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
