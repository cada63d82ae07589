//! Field typing for PII values.
//!
//! Every PII value entering encryption or logging is tagged with exactly one
//! [`FieldType`]. The type drives three total mappings: format validation
//! (before any cryptographic work), masking for display, and the PII-shape
//! scan the audit write path uses to reject unmasked values.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{KycError, Result};

/// Closed enumeration of PII field categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    FullName,
    DateOfBirth,
    Ssn,
    TaxId,
    Address,
    Phone,
    Email,
    BankAccount,
    Document,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::FullName,
        FieldType::DateOfBirth,
        FieldType::Ssn,
        FieldType::TaxId,
        FieldType::Address,
        FieldType::Phone,
        FieldType::Email,
        FieldType::BankAccount,
        FieldType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::FullName => "full_name",
            FieldType::DateOfBirth => "date_of_birth",
            FieldType::Ssn => "ssn",
            FieldType::TaxId => "tax_id",
            FieldType::Address => "address",
            FieldType::Phone => "phone",
            FieldType::Email => "email",
            FieldType::BankAccount => "bank_account",
            FieldType::Document => "document",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn full_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\p{L}][\p{L}' .\-]{1,99}$").unwrap())
}

fn dob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap())
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{3}-\d{2}-\d{4}|\d{9})$").unwrap())
}

fn tax_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2}-\d{7}|\d{3}-\d{2}-\d{4}|\d{9})$").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ().\-]{5,19}$").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap())
}

fn bank_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{8,17}$").unwrap())
}

fn fail(field_type: FieldType, reason: &str) -> KycError {
    KycError::Validation {
        field_type,
        reason: reason.to_string(),
    }
}

/// Validates a PII value against its field type's format rule.
///
/// Runs before any key derivation or encryption; an invalid value leaves no
/// partial state behind.
pub fn validate(value: &str, field_type: FieldType) -> Result<()> {
    match field_type {
        FieldType::FullName => {
            if !full_name_re().is_match(value) {
                return Err(fail(field_type, "expected 2-100 name characters"));
            }
        }
        FieldType::DateOfBirth => {
            let caps = dob_re()
                .captures(value)
                .ok_or_else(|| fail(field_type, "expected YYYY-MM-DD"))?;
            let year: u32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);
            if !(1900..=2100).contains(&year)
                || !(1..=12).contains(&month)
                || !(1..=31).contains(&day)
            {
                return Err(fail(field_type, "date out of range"));
            }
        }
        FieldType::Ssn => {
            if !ssn_re().is_match(value) {
                return Err(fail(field_type, "expected NNN-NN-NNNN or 9 digits"));
            }
        }
        FieldType::TaxId => {
            if !tax_id_re().is_match(value) {
                return Err(fail(field_type, "expected a 9-digit tax identifier"));
            }
        }
        FieldType::Address => {
            let len = value.chars().count();
            if !(5..=200).contains(&len) || value.chars().any(|c| c.is_control()) {
                return Err(fail(field_type, "expected 5-200 printable characters"));
            }
        }
        FieldType::Phone => {
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            if !phone_re().is_match(value) || !(7..=15).contains(&digits) {
                return Err(fail(field_type, "expected 7-15 digits"));
            }
        }
        FieldType::Email => {
            if !email_re().is_match(value) {
                return Err(fail(field_type, "expected local@domain.tld"));
            }
        }
        FieldType::BankAccount => {
            if !bank_account_re().is_match(value) {
                return Err(fail(field_type, "expected 8-17 digits"));
            }
        }
        FieldType::Document => {
            if value.is_empty() || value.len() > 256 {
                return Err(fail(field_type, "expected 1-256 bytes"));
            }
        }
    }
    Ok(())
}

/// Masks all digits except the trailing four, keeping separators.
fn mask_digits_keep_last4(value: &str) -> String {
    let total = value.chars().filter(|c| c.is_ascii_digit()).count();
    if total <= 4 {
        return value.to_string();
    }
    let mut seen = 0usize;
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen <= total - 4 {
                    '*'
                } else {
                    c
                }
            } else {
                c
            }
        })
        .collect()
}

/// Produces a partially redacted display string for a PII value.
///
/// Pure and idempotent: masking an already-masked value yields the same
/// string. Non-reversible by construction.
pub fn mask(value: &str, field_type: FieldType) -> String {
    match field_type {
        FieldType::FullName => value
            .split_whitespace()
            .map(|word| {
                let mut out: String = word.chars().take(1).collect();
                out.push_str("***");
                out
            })
            .collect::<Vec<_>>()
            .join(" "),
        FieldType::DateOfBirth => value
            .chars()
            .map(|c| if c.is_ascii_digit() { '*' } else { c })
            .collect(),
        FieldType::Ssn | FieldType::TaxId | FieldType::Phone | FieldType::BankAccount => {
            mask_digits_keep_last4(value)
        }
        FieldType::Email => match value.split_once('@') {
            Some((local, domain)) => {
                let mut out: String = local.chars().take(1).collect();
                out.push_str("***@");
                out.push_str(domain);
                out
            }
            None => "***".to_string(),
        },
        FieldType::Address => match value.split_once(char::is_whitespace) {
            Some((first, _)) => format!("{} ***", first),
            None => "***".to_string(),
        },
        FieldType::Document => "***".to_string(),
    }
}

fn detect_ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap())
}

fn detect_email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").unwrap()
    })
}

fn detect_long_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{8,17}\b").unwrap())
}

fn detect_dob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap())
}

fn detect_phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}[ .\-]\d{3}[ .\-]\d{4}\b").unwrap())
}

/// Scans free text for a value matching a known PII shape.
///
/// Used by the audit write path; masked values (digits replaced by `*`) do
/// not match any shape. Returns the first shape found.
pub fn detect_pii(text: &str) -> Option<FieldType> {
    if detect_ssn_re().is_match(text) {
        return Some(FieldType::Ssn);
    }
    if detect_email_re().is_match(text) {
        return Some(FieldType::Email);
    }
    if detect_long_digits_re().is_match(text) {
        return Some(FieldType::BankAccount);
    }
    if detect_dob_re().is_match(text) {
        return Some(FieldType::DateOfBirth);
    }
    if detect_phone_re().is_match(text) {
        return Some(FieldType::Phone);
    }
    None
}
