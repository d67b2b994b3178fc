//! Birthdate parsing.
//!
//! Exact formats are tried first, and a format only counts as a match when
//! formatting the parsed date with it reproduces the input byte for byte. That
//! keeps `03/04/1990`-style inputs from silently swapping day and month when an
//! earlier format happens to accept them with a different reading. Anything
//! else falls back to `dateparser`, interpreted in UTC.

use chrono::{NaiveDate, Utc};

/// Exact formats in priority order: ISO, day-first, month-first.
pub const EXACT_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y"];

/// Parse a birthdate cell. Unparseable input yields `None`, never an error.
pub fn parse_birthdate(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    parse_exact(raw).or_else(|| parse_free_form(raw))
}

/// Try each exact format, accepting the first that round-trips.
pub fn parse_exact(raw: &str) -> Option<NaiveDate> {
    EXACT_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .filter(|date| date.format(format).to_string() == raw)
    })
}

fn parse_free_form(raw: &str) -> Option<NaiveDate> {
    match dateparser::parse_with_timezone(raw, &Utc) {
        Ok(parsed) => Some(parsed.date_naive()),
        Err(e) => {
            log::debug!("unparseable birthdate '{}': {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_each_exact_format() {
        assert_eq!(parse_birthdate("1990-04-03"), Some(date(1990, 4, 3)));
        assert_eq!(parse_birthdate("25/12/1990"), Some(date(1990, 12, 25)));
        assert_eq!(parse_birthdate("12/25/1990"), Some(date(1990, 12, 25)));
        assert_eq!(parse_birthdate("25-12-1990"), Some(date(1990, 12, 25)));
        assert_eq!(parse_birthdate("12-25-1990"), Some(date(1990, 12, 25)));
    }

    #[test]
    fn ambiguous_slash_dates_read_day_first() {
        assert_eq!(parse_birthdate("03/04/1990"), Some(date(1990, 4, 3)));
    }

    #[test]
    fn exact_matches_round_trip_to_the_input() {
        for (input, format) in [
            ("2001-02-03", "%Y-%m-%d"),
            ("28/02/1985", "%d/%m/%Y"),
            ("02/28/1985", "%m/%d/%Y"),
            ("31-01-1970", "%d-%m-%Y"),
            ("01-31-1970", "%m-%d-%Y"),
        ] {
            let parsed = parse_exact(input).unwrap();
            assert_eq!(parsed.format(format).to_string(), input);
        }
    }

    #[test]
    fn unpadded_input_is_not_an_exact_match() {
        assert_eq!(parse_exact("1990-4-3"), None);
    }

    #[test]
    fn falls_back_to_free_form_parsing() {
        assert_eq!(
            parse_birthdate("1990-05-03T10:00:00Z"),
            Some(date(1990, 5, 3))
        );
        assert_eq!(
            parse_birthdate("Thu, 03 May 1990 10:00:00 +0000"),
            Some(date(1990, 5, 3))
        );
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_birthdate("not a date"), None);
        assert_eq!(parse_birthdate("   "), None);
        assert_eq!(parse_birthdate("31/31/1990"), None);
    }
}
