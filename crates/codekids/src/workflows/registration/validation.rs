use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use super::domain::{parse_leading_int, RegistrationForm, SkillLevel, ValidatedRegistration};

pub(crate) const FIRST_NAME_MESSAGE: &str = "First name must be at least 2 characters.";
pub(crate) const LAST_NAME_MESSAGE: &str = "Last name must be at least 2 characters.";
pub(crate) const PARENT_NAME_MESSAGE: &str = "Parent name must be at least 2 characters.";
pub(crate) const EMAIL_MESSAGE: &str = "Please enter a valid email address.";
pub(crate) const PHONE_MESSAGE: &str = "Phone number must be at least 10 digits.";
pub(crate) const AGE_MESSAGE: &str = "Please enter a valid age.";
pub(crate) const SKILL_REQUIRED_MESSAGE: &str = "Please select a skill level.";
pub(crate) const SKILL_UNKNOWN_MESSAGE: &str =
    "Skill level must be beginner, intermediate, or advanced.";

/// Form fields that carry schema rules, keyed the way the form names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    ChildFirstName,
    ChildLastName,
    ChildAge,
    ParentName,
    Email,
    Phone,
    SkillLevel,
    AdditionalInfo,
}

impl FormField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormField::ChildFirstName => "childFirstName",
            FormField::ChildLastName => "childLastName",
            FormField::ChildAge => "childAge",
            FormField::ParentName => "parentName",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::SkillLevel => "skillLevel",
            FormField::AdditionalInfo => "additionalInfo",
        }
    }

    fn from_struct_field(name: &str) -> Option<Self> {
        match name {
            "child_first_name" => Some(FormField::ChildFirstName),
            "child_last_name" => Some(FormField::ChildLastName),
            "child_age" => Some(FormField::ChildAge),
            "parent_name" => Some(FormField::ParentName),
            "email" => Some(FormField::Email),
            "phone" => Some(FormField::Phone),
            "skill_level" => Some(FormField::SkillLevel),
            "additional_info" => Some(FormField::AdditionalInfo),
            _ => None,
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failing field with its messages, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<FormField, Vec<String>>);

impl FieldErrors {
    pub fn get(&self, field: FormField) -> Option<&[String]> {
        self.0.get(&field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: FormField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = FormField> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn single(field: FormField, message: &str) -> Self {
        let mut errors = FieldErrors::default();
        errors.push(field, message.to_string());
        errors
    }

    fn push(&mut self, field: FormField, message: String) {
        self.0.entry(field).or_default().push(message);
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::default();
        for (name, failures) in errors.field_errors() {
            let Some(field) = FormField::from_struct_field(&name) else {
                continue;
            };
            for failure in failures {
                let message = failure
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                fields.push(field, message);
            }
        }
        fields
    }
}

/// Run every schema rule against `form`.
///
/// Rules are independent: the error map lists every failing field, not just the
/// first. Pure; no I/O.
pub fn validate(form: &RegistrationForm) -> Result<ValidatedRegistration, FieldErrors> {
    Validate::validate(form).map_err(FieldErrors::from)?;

    let Some(child_age) = age_from(&form.child_age) else {
        return Err(FieldErrors::single(FormField::ChildAge, AGE_MESSAGE));
    };
    let Some(skill_level) = form.skill_level.as_deref().and_then(SkillLevel::parse) else {
        return Err(FieldErrors::single(FormField::SkillLevel, SKILL_REQUIRED_MESSAGE));
    };

    Ok(ValidatedRegistration {
        form: form.clone(),
        child_age,
        skill_level,
    })
}

fn age_from(raw: &str) -> Option<u32> {
    parse_leading_int(raw)
        .filter(|age| *age > 0)
        .and_then(|age| u32::try_from(age).ok())
}

/// Length in UTF-16 code units, the unit browser form inputs count in.
fn form_length(raw: &str) -> usize {
    raw.encode_utf16().count()
}

fn min_length(
    raw: &str,
    min: usize,
    code: &'static str,
    message: &'static str,
) -> Result<(), ValidationError> {
    if form_length(raw) >= min {
        Ok(())
    } else {
        Err(rule_failure(code, message))
    }
}

pub(crate) fn validate_child_first_name(raw: &str) -> Result<(), ValidationError> {
    min_length(raw, 2, "child_first_name", FIRST_NAME_MESSAGE)
}

pub(crate) fn validate_child_last_name(raw: &str) -> Result<(), ValidationError> {
    min_length(raw, 2, "child_last_name", LAST_NAME_MESSAGE)
}

pub(crate) fn validate_parent_name(raw: &str) -> Result<(), ValidationError> {
    min_length(raw, 2, "parent_name", PARENT_NAME_MESSAGE)
}

pub(crate) fn validate_phone(raw: &str) -> Result<(), ValidationError> {
    min_length(raw, 10, "phone", PHONE_MESSAGE)
}

/// Standard address syntax, plus a dotted domain ending in an alphabetic label
/// of at least two letters. `anne@localhost` and `a@b` are refused.
pub(crate) fn validate_email_address(raw: &str) -> Result<(), ValidationError> {
    if raw.validate_email() && has_top_level_domain(raw) {
        Ok(())
    } else {
        Err(rule_failure("email", EMAIL_MESSAGE))
    }
}

fn has_top_level_domain(address: &str) -> bool {
    let Some((_, domain)) = address.rsplit_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && tld.bytes().all(|byte| byte.is_ascii_alphabetic())
}

pub(crate) fn validate_child_age(raw: &str) -> Result<(), ValidationError> {
    match age_from(raw) {
        Some(_) => Ok(()),
        None => Err(rule_failure("child_age", AGE_MESSAGE)),
    }
}

pub(crate) fn validate_skill_level(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(rule_failure("skill_level", SKILL_REQUIRED_MESSAGE));
    }
    match SkillLevel::parse(raw) {
        Some(_) => Ok(()),
        None => Err(rule_failure("skill_level", SKILL_UNKNOWN_MESSAGE)),
    }
}

fn rule_failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}
