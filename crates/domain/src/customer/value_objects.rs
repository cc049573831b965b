//! Value objects for the customer domain.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::FieldError;

/// `local@label.tld` over lower-cased input. The local part is alphanumeric
/// runs joined by single separators, which also rules out `..`.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._+-][a-z0-9]+)*@[a-z0-9-]+\.[a-z]{2,}$")
        .expect("Invalid email regex")
});

/// International mobile number: `+`, then 8 to 16 characters starting and
/// ending with a digit.
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+[0-9][0-9\s\-.()]{6,14}[0-9]$").expect("Invalid phone regex")
});

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 50;
pub const MIN_BANK_ACCOUNT_LEN: usize = 8;
pub const MAX_BANK_ACCOUNT_LEN: usize = 20;
pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 120;

/// A normalized (trimmed, lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(input: &str) -> Result<Self, FieldError> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(FieldError::new("email", "email is required"));
        }
        if !EMAIL_REGEX.is_match(&normalized) {
            return Err(FieldError::new(
                "email",
                format!("`{}` is not a valid email address", input.trim()),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mobile phone number stored as `+` followed by its digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(input: &str) -> Result<Self, FieldError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FieldError::new("phone_number", "phone number is required"));
        }
        if !PHONE_REGEX.is_match(trimmed) {
            return Err(FieldError::new(
                "phone_number",
                format!("`{trimmed}` is not a valid mobile phone number"),
            ));
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
            return Err(FieldError::new(
                "phone_number",
                format!(
                    "mobile phone number must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"
                ),
            ));
        }

        Ok(Self(format!("+{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims a name and checks its length in characters.
pub fn parse_name(field: &'static str, input: &str) -> Result<String, FieldError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(field, "name is required"));
    }
    let len = trimmed.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(FieldError::new(
            field,
            format!("must be between {MIN_NAME_LEN} and {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Drops whitespace and `-` separators from a bank account number and checks
/// the rest is 8 to 20 ASCII digits.
pub fn parse_bank_account_number(input: &str) -> Result<String, FieldError> {
    const FIELD: &str = "bank_account_number";

    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if cleaned.is_empty() {
        return Err(FieldError::new(FIELD, "bank account number is required"));
    }
    if !(MIN_BANK_ACCOUNT_LEN..=MAX_BANK_ACCOUNT_LEN).contains(&cleaned.len()) {
        return Err(FieldError::new(
            FIELD,
            format!(
                "must be between {MIN_BANK_ACCOUNT_LEN} and {MAX_BANK_ACCOUNT_LEN} characters"
            ),
        ));
    }
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::new(FIELD, "must contain digits only"));
    }
    Ok(cleaned)
}

/// Completed years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Checks that the date lies in the past and the age is plausible.
pub fn check_date_of_birth(date_of_birth: NaiveDate, today: NaiveDate) -> Result<(), FieldError> {
    const FIELD: &str = "date_of_birth";

    if date_of_birth >= today {
        return Err(FieldError::new(FIELD, "date of birth must be in the past"));
    }
    let age = age_on(date_of_birth, today);
    if age < MIN_AGE {
        return Err(FieldError::new(
            FIELD,
            format!("customer must be at least {MIN_AGE} years old"),
        ));
    }
    if age > MAX_AGE {
        return Err(FieldError::new(
            FIELD,
            format!("age cannot exceed {MAX_AGE} years"),
        ));
    }
    Ok(())
}
