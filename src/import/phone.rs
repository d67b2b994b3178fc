//! US phone number plausibility checks and E.164 normalization.
//!
//! Numbers follow the North American Numbering Plan: an optional `+1`/`1`/`001`
//! country prefix followed by a ten digit national number whose area code and
//! exchange both start with 2-9. Common punctuation (spaces, dashes, dots,
//! parentheses) is ignored; anything else makes the number implausible.

/// Parsed NANP national number (ten digits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsPhoneNumber {
    national: String,
}

impl UsPhoneNumber {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (has_plus, rest) = match raw.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let mut digits = String::with_capacity(rest.len());
        for ch in rest.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return None,
            }
        }

        let national = if has_plus {
            digits.strip_prefix('1')?
        } else if digits.len() == 11 {
            digits.strip_prefix('1')?
        } else if digits.len() == 13 {
            digits.strip_prefix("001")?
        } else {
            digits.as_str()
        };

        if !is_plausible_national(national) {
            return None;
        }

        Some(Self {
            national: national.to_string(),
        })
    }

    /// `+1XXXXXXXXXX`
    pub fn e164(&self) -> String {
        format!("+1{}", self.national)
    }
}

fn is_plausible_national(national: &str) -> bool {
    let bytes = national.as_bytes();
    bytes.len() == 10
        && bytes.iter().all(u8::is_ascii_digit)
        && (b'2'..=b'9').contains(&bytes[0])
        && (b'2'..=b'9').contains(&bytes[3])
}

pub fn is_plausible_us_number(raw: &str) -> bool {
    UsPhoneNumber::parse(raw).is_some()
}

/// E.164 form when the number parses, the trimmed input otherwise.
pub fn normalize_us_phone(raw: &str) -> String {
    UsPhoneNumber::parse(raw)
        .map(|number| number.e164())
        .unwrap_or_else(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_us_formats() {
        for raw in [
            "(415) 555-2671",
            "415-555-2671",
            "415.555.2671",
            "4155552671",
            "1 415 555 2671",
            "+1 415 555 2671",
            "+14155552671",
            "001 415 555 2671",
        ] {
            assert_eq!(normalize_us_phone(raw), "+14155552671", "input {raw}");
        }
    }

    #[test]
    fn rejects_implausible_numbers() {
        for raw in [
            "555-2671",
            "(015) 555-2671",
            "415-155-2671",
            "+44 20 7946 0958",
            "415-555-267x",
            "call me",
            "",
        ] {
            assert!(!is_plausible_us_number(raw), "input {raw}");
        }
    }

    #[test]
    fn normalization_falls_back_to_trimmed_input() {
        assert_eq!(normalize_us_phone("  ext. 12 "), "ext. 12");
    }
}
