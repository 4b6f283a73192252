use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::error::ValidationError;
use crate::store::Record;

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Wire and storage format for `dob`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column names of the patient table.
pub mod fields {
    pub const PATIENT_ID: &str = "patient_id";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const PASSWORD_HASH: &str = "password_hash";
    pub const DOB: &str = "dob";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const IS_OKU: &str = "is_oku";
}

/// Body of `POST /patients`
#[derive(Clone, Deserialize)]
pub struct CreatePatient {
    pub name: String,
    pub email: String,
    pub password: String,
    pub dob: Option<NaiveDate>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_oku: bool,
}

impl CreatePatient {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password("password", &self.password)
    }
}

impl fmt::Debug for CreatePatient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatePatient")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("dob", &self.dob)
            .field("phone_number", &self.phone_number)
            .field("is_oku", &self.is_oku)
            .finish()
    }
}

/// Body of `PUT /patients/{patient_id}`.
///
/// Omitted and `null` fields are both left untouched. Unknown keys (including
/// `email` and `password_hash`) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatient {
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub is_oku: Option<bool>,
}

impl UpdatePatient {
    /// Storage fields to write, restricted to the ones present in the request.
    pub fn into_fields(self) -> Result<Record, ValidationError> {
        let mut record = Record::new();

        if let Some(name) = self.name {
            validate_name(&name)?;
            record.insert(fields::NAME.to_string(), Value::String(name));
        }
        if let Some(dob) = self.dob {
            record.insert(
                fields::DOB.to_string(),
                Value::String(dob.format(DATE_FORMAT).to_string()),
            );
        }
        if let Some(phone_number) = self.phone_number {
            record.insert(fields::PHONE_NUMBER.to_string(), Value::String(phone_number));
        }
        if let Some(is_oku) = self.is_oku {
            record.insert(fields::IS_OKU.to_string(), Value::Bool(is_oku));
        }

        if record.is_empty() {
            return Err(ValidationError::new("body", "no valid fields to update"));
        }
        Ok(record)
    }
}

/// Body of `PUT /patients/{patient_id}/password`
#[derive(Clone, Deserialize)]
pub struct PasswordUpdate {
    pub new_password: String,
}

impl PasswordUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_password("new_password", &self.new_password)
    }
}

impl fmt::Debug for PasswordUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordUpdate")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

/// Public projection of a patient. Never carries credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientView {
    pub patient_id: Uuid,
    pub name: String,
    pub email: String,
    pub dob: Option<NaiveDate>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_oku: bool,
}

impl PatientView {
    /// Project a stored record, dropping `password_hash` and any other extra columns.
    pub fn from_record(record: Record) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record))
    }
}

/// Confirmation returned by a successful password change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordUpdated {
    pub patient_id: Uuid,
    pub message: String,
}

impl PasswordUpdated {
    pub fn new(patient_id: Uuid) -> Self {
        Self {
            patient_id,
            message: "Password updated successfully".to_string(),
        }
    }
}

/// Full row as written on create.
#[derive(Clone)]
pub struct PatientRecord {
    pub patient_id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub dob: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub is_oku: bool,
}

impl PatientRecord {
    pub fn new(patient_id: Uuid, input: CreatePatient, password_hash: String) -> Self {
        Self {
            patient_id,
            name: input.name,
            email: input.email,
            password_hash,
            dob: input.dob,
            phone_number: input.phone_number,
            is_oku: input.is_oku,
        }
    }

    pub fn into_record(self) -> Record {
        let mut record = Record::new();
        record.insert(
            fields::PATIENT_ID.to_string(),
            Value::String(self.patient_id.to_string()),
        );
        record.insert(fields::NAME.to_string(), Value::String(self.name));
        record.insert(fields::EMAIL.to_string(), Value::String(self.email));
        record.insert(
            fields::PASSWORD_HASH.to_string(),
            Value::String(self.password_hash),
        );
        record.insert(
            fields::DOB.to_string(),
            self.dob
                .map(|dob| Value::String(dob.format(DATE_FORMAT).to_string()))
                .unwrap_or(Value::Null),
        );
        record.insert(
            fields::PHONE_NUMBER.to_string(),
            self.phone_number.map(Value::String).unwrap_or(Value::Null),
        );
        record.insert(fields::IS_OKU.to_string(), Value::Bool(self.is_oku));
        record
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new(fields::NAME, "must not be empty"));
    }
    Ok(())
}

fn validate_password(field: &str, password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Printable characters allowed in an unquoted local part besides letters and digits.
const ATEXT_SYMBOLS: &str = "!#$%&'*+-/=?^_`{|}~";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || ATEXT_SYMBOLS.contains(c)
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new(fields::EMAIL, "must be a valid email address");

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;

    // Dot-atom: non-empty runs of atext separated by single dots.
    let valid_local = local
        .split('.')
        .all(|atom| !atom.is_empty() && atom.chars().all(is_atext));
    if !valid_local {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid());
    }
    for label in &labels {
        let valid_label = !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid_label {
            return Err(invalid());
        }
    }
    if labels
        .last()
        .map_or(true, |tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid());
    }
    Ok(())
}
