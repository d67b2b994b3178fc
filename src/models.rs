use crate::import::phone::normalize_us_phone;
use chrono::{DateTime, NaiveDate, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ===== Contact Models =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct Contact {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact as served by the listing endpoint, with read-side derivations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContactResponse {
    #[serde(flatten)]
    pub contact: Contact,
    pub gravatar_url: String,
    pub formatted_phone: Option<String>,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            gravatar_url: gravatar_url(&contact.email),
            formatted_phone: contact.phone.as_deref().map(normalize_us_phone),
            contact,
        }
    }
}

/// Identicon avatar keyed by the SHA-256 of the trimmed, lower-cased email.
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let hash: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
    format!("https://www.gravatar.com/avatar/{}?d=identicon&s=80", hash)
}

// ===== Response Envelopes =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let last_page = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };

        Self {
            data,
            current_page: page,
            per_page,
            total,
            last_page,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
    pub file_name: String,
    pub file_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Human-readable size with two decimals, e.g. `1.50 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_file_sizes() {
        assert_eq!(format_file_size(0), "0.00 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50.00 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn gravatar_hash_ignores_case_and_whitespace() {
        let url = gravatar_url(" Jane@X.com ");
        assert_eq!(url, gravatar_url("jane@x.com"));
        assert!(url.starts_with("https://www.gravatar.com/avatar/"));
        assert!(url.ends_with("?d=identicon&s=80"));

        let hash = url
            .trim_start_matches("https://www.gravatar.com/avatar/")
            .trim_end_matches("?d=identicon&s=80");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn pagination_math() {
        let page: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 2, 15, 31);
        assert_eq!(page.last_page, 3);
        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 1, 15, 0);
        assert_eq!(empty.last_page, 1);
    }
}
