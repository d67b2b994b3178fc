//! Field-level validation of candidate records.

use crate::import::phone::is_plausible_us_number;
use crate::import::reader::CandidateRecord;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const MAX_FIELD_CHARS: usize = 255;

/// Single-label domains such as `localhost` are valid addresses.
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
        )
        .expect("Invalid email regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Every constraint a record violated, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<String>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Check a candidate record. Birthdates are typed, so any present value is
/// already a valid calendar date.
pub fn validate(record: &CandidateRecord) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if record.name.is_empty() {
        errors.push("The name field is required.".to_string());
    } else if record.name.chars().count() > MAX_FIELD_CHARS {
        errors.push(format!(
            "The name field must not be greater than {} characters.",
            MAX_FIELD_CHARS
        ));
    }

    if record.email.is_empty() {
        errors.push("The email field is required.".to_string());
    } else {
        if !is_valid_email(&record.email) {
            errors.push("The email field must be a valid email address.".to_string());
        }
        if record.email.chars().count() > MAX_FIELD_CHARS {
            errors.push(format!(
                "The email field must not be greater than {} characters.",
                MAX_FIELD_CHARS
            ));
        }
    }

    if let Some(phone) = &record.phone {
        if !is_plausible_us_number(phone) {
            errors.push("The phone field must be a valid number.".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, email: &str, phone: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.map(str::to_string),
            birthdate: None,
        }
    }

    #[test]
    fn accepts_a_complete_record() {
        assert!(validate(&record("Jane Doe", "jane@x.com", Some("(415) 555-2671"))).is_ok());
        assert!(validate(&record("Jane Doe", "jane.doe+tag@mail.example.org", None)).is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        let errors = validate(&record("A", "not-an-email", None)).unwrap_err();
        assert_eq!(
            errors.to_string(),
            "The email field must be a valid email address."
        );
    }

    #[test]
    fn accepts_single_label_domains() {
        assert!(is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@-localhost"));
        assert!(!is_valid_email("user@localhost."));
    }

    #[test]
    fn reports_every_violation_joined() {
        let errors = validate(&record("", "", Some("12"))).unwrap_err();
        assert_eq!(
            errors.to_string(),
            "The name field is required., The email field is required., The phone field must be a valid number."
        );
    }

    #[test]
    fn enforces_length_limits_in_characters() {
        let at_limit = "é".repeat(MAX_FIELD_CHARS);
        assert!(validate(&record(&at_limit, "a@x.com", None)).is_ok());

        let too_long = "a".repeat(MAX_FIELD_CHARS + 1);
        let errors = validate(&record(&too_long, "a@x.com", None)).unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert!(errors.0[0].starts_with("The name field must not be greater than 255"));

        let long_email = format!("{}@x.com", "a".repeat(MAX_FIELD_CHARS));
        let errors = validate(&record("A", &long_email, None)).unwrap_err();
        assert!(errors.0.iter().any(|e| e.contains("email field must not be greater")));
    }
}
