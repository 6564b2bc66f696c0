use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validation::{
    validate_child_age, validate_child_first_name, validate_child_last_name,
    validate_email_address, validate_parent_name, validate_phone, validate_skill_level,
};

/// Raw form values exactly as the parent typed them.
///
/// Every field is text except `skill_level`, which comes from a fixed select, and
/// `additional_info`, which is optional. Nothing here is trusted until it has been
/// through [`validate`](super::validation::validate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    #[serde(default)]
    #[validate(custom(function = "validate_child_first_name"))]
    pub child_first_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_child_last_name"))]
    pub child_last_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_child_age"))]
    pub child_age: String,
    #[serde(default)]
    #[validate(custom(function = "validate_parent_name"))]
    pub parent_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_email_address"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[serde(default)]
    #[validate(
        required(message = "Please select a skill level."),
        custom(function = "validate_skill_level")
    )]
    pub skill_level: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

impl Default for RegistrationForm {
    /// Blank form as first rendered: everything empty, "beginner" preselected.
    fn default() -> Self {
        Self {
            child_first_name: String::new(),
            child_last_name: String::new(),
            child_age: String::new(),
            parent_name: String::new(),
            email: String::new(),
            phone: String::new(),
            skill_level: Some(SkillLevel::Beginner.as_str().to_string()),
            additional_info: Some(String::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub const ALL: [SkillLevel; 3] = [
        SkillLevel::Beginner,
        SkillLevel::Intermediate,
        SkillLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == raw)
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned lifecycle of a stored registration. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Verified,
}

impl RegistrationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Verified => "verified",
        }
    }

    /// Apply a requested status without ever moving backwards.
    pub fn advance(self, requested: RegistrationStatus) -> RegistrationStatus {
        match (self, requested) {
            (RegistrationStatus::Verified, _) => RegistrationStatus::Verified,
            (RegistrationStatus::Pending, requested) => requested,
        }
    }
}

/// A form that passed every schema rule. Only the validator builds these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRegistration {
    pub(crate) form: RegistrationForm,
    pub(crate) child_age: u32,
    pub(crate) skill_level: SkillLevel,
}

impl ValidatedRegistration {
    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn child_age(&self) -> u32 {
        self.child_age
    }

    pub fn skill_level(&self) -> SkillLevel {
        self.skill_level
    }

    pub fn email(&self) -> &str {
        &self.form.email
    }

    pub fn phone(&self) -> &str {
        &self.form.phone
    }

    pub fn parent_name(&self) -> &str {
        &self.form.parent_name
    }

    /// Map into the storage shape handed to the persistence collaborator.
    pub fn to_row(&self) -> RegistrationRow {
        RegistrationRow {
            child_first_name: self.form.child_first_name.clone(),
            child_last_name: self.form.child_last_name.clone(),
            child_age: self.child_age,
            parent_name: self.form.parent_name.clone(),
            email: self.form.email.clone(),
            phone: self.form.phone.clone(),
            skill_level: self.skill_level,
            additional_info: self.form.additional_info.clone().unwrap_or_default(),
        }
    }
}

/// Insert payload for the `registration_requests` table. `status` is left to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub child_first_name: String,
    pub child_last_name: String,
    pub child_age: u32,
    pub parent_name: String,
    pub email: String,
    pub phone: String,
    pub skill_level: SkillLevel,
    pub additional_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

/// Row as held by a backend after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegistration {
    pub id: RegistrationId,
    #[serde(flatten)]
    pub row: RegistrationRow,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
}

impl StoredRegistration {
    pub fn pending(id: RegistrationId, row: RegistrationRow, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            row,
            status: RegistrationStatus::Pending,
            created_at,
        }
    }
}

/// Lenient integer read used for the age field.
///
/// Skips leading whitespace, accepts one sign, then reads the leading decimal
/// digits; anything after them is ignored. `"12 years"` reads as 12, `"3.5"` as 3,
/// and `"abc"` or an overflowing value as `None`.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }

    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
