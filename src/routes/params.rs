//! Query parameter helpers shared by the API route handlers.
//!
//! The types follow Rocket's `FromForm` conventions and derive `JsonSchema` so
//! generated documentation reflects the available parameters and their defaults.

use crate::error::ApiError;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

const fn default_page() -> i64 {
    1
}

const fn default_per_page() -> i64 {
    15
}

const MAX_PER_PAGE: i64 = 100;

/// Pagination and search for the contact listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, rocket::form::FromForm)]
pub struct ContactListParams {
    /// One-based page index (defaults to the first page).
    #[field(default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,
    /// Contacts per page (clamped between 1 and 100, default 15).
    #[field(default = 15)]
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    /// Case-insensitive substring matched against name and email.
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for ContactListParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            search: None,
        }
    }
}

impl ContactListParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    /// `ILIKE` pattern for the search term, with wildcards in the term escaped.
    pub fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }

        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

/// Extract a non-empty session id from an optional query value.
pub fn require_session_id(session_id: Option<String>) -> Result<String, ApiError> {
    session_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Session ID is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_pagination() {
        let params = ContactListParams {
            page: 0,
            per_page: 1_000,
            search: None,
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), 100);
        assert_eq!(params.offset(), 0);

        let params = ContactListParams {
            page: 3,
            ..ContactListParams::default()
        };
        assert_eq!(params.offset(), 30);
    }

    #[test]
    fn huge_page_saturates_the_offset() {
        let params = ContactListParams {
            page: i64::MAX,
            per_page: 100,
            search: None,
        };
        assert_eq!(params.offset(), i64::MAX);
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        let params = ContactListParams {
            search: Some(" 100%_off ".to_string()),
            ..ContactListParams::default()
        };
        assert_eq!(params.search_pattern().as_deref(), Some("%100\\%\\_off%"));

        let blank = ContactListParams {
            search: Some("   ".to_string()),
            ..ContactListParams::default()
        };
        assert_eq!(blank.search_pattern(), None);
    }

    #[test]
    fn session_id_is_required() {
        assert!(matches!(
            require_session_id(Some("  ".to_string())),
            Err(ApiError::BadRequest(msg)) if msg == "Session ID is required"
        ));
        assert_eq!(require_session_id(Some("abc".to_string())).unwrap(), "abc");
    }
}
