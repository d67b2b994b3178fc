use crate::config::ImportConfig;
use crate::error::ApiError;
use crate::jobs::{JobQueue, NewImportJob, queue_import};
use crate::models::{Contact, ContactResponse, PaginatedResponse, UploadResponse, format_file_size};
use crate::progress::ProgressHub;
use crate::routes::params::ContactListParams;
use rocket::State;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::openapi;
use std::path::Path;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// List contacts, newest first, with optional name/email search.
#[openapi(tag = "Contacts")]
#[get("/contacts?<params..>")]
pub async fn list_contacts(
    params: Option<ContactListParams>,
    pool: &State<PgPool>,
) -> Result<Json<PaginatedResponse<ContactResponse>>, ApiError> {
    let params = params.unwrap_or_default();
    let pattern = params.search_pattern();

    let total: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM contacts
           WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1"#,
    )
    .bind(&pattern)
    .fetch_one(pool.inner())
    .await?;

    let contacts: Vec<Contact> = sqlx::query_as(
        r#"SELECT id, name, email, phone, birthdate, created_at, updated_at
           FROM contacts
           WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(&pattern)
    .bind(params.per_page())
    .bind(params.offset())
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(PaginatedResponse::new(
        contacts.into_iter().map(ContactResponse::from).collect(),
        params.page(),
        params.per_page(),
        total,
    )))
}

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub csv_file: Option<TempFile<'r>>,
    pub session_id: Option<String>,
}

/// Accept a CSV/TXT upload and queue it for background import.
#[post("/contacts/upload", data = "<form>")]
pub async fn upload_contacts(
    mut form: Form<UploadForm<'_>>,
    config: &State<ImportConfig>,
    queue: &State<JobQueue>,
    progress: &State<ProgressHub>,
) -> Result<Json<UploadResponse>, ApiError> {
    let session_id = match form.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => validate_session_id(id)?,
        _ => format!("upload_{}", Uuid::new_v4().simple()),
    };

    let file = match form.csv_file.as_mut() {
        Some(file) if file.len() > 0 => file,
        _ => return Err(ApiError::Validation("The CSV file is required.".to_string())),
    };

    let file_name = original_file_name(file)
        .ok_or_else(|| ApiError::Validation("The file must be a CSV or TXT file.".to_string()))?;

    if file.len() > config.max_upload_bytes {
        return Err(ApiError::Validation(format!(
            "The file may not be larger than {}MB.",
            config.max_upload_bytes / (1024 * 1024)
        )));
    }

    let file_size = format_file_size(file.len());

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let stored_path = config
        .upload_dir
        .join(format!("{}_{}", session_id, file_name));
    file.move_copy_to(&stored_path).await?;

    let job = NewImportJob {
        session_id: session_id.clone(),
        file_path: stored_path.to_string_lossy().into_owned(),
        file_name: file_name.clone(),
        max_attempts: config.max_attempts,
    };
    queue_import(queue.inner(), progress.inner(), &job, &file_size).await?;

    Ok(Json(UploadResponse {
        success: true,
        session_id,
        message: "File uploaded successfully. Processing queued...".to_string(),
        file_name,
        file_size,
    }))
}

/// Client-supplied session ids end up in file names, so keep them tame.
fn validate_session_id(id: &str) -> Result<String, ApiError> {
    let valid = id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

    if valid && !id.starts_with('.') {
        Ok(id.to_string())
    } else {
        Err(ApiError::Validation(
            "The session id may only contain letters, numbers, dashes, dots and underscores."
                .to_string(),
        ))
    }
}

/// Base name of the uploaded file when its extension is allowed.
fn original_file_name(file: &TempFile<'_>) -> Option<String> {
    let raw = file.raw_name()?.dangerous_unsafe_unsanitized_raw().as_str();
    let base = Path::new(raw).file_name()?.to_str()?;
    let extension = Path::new(base).extension()?.to_str()?.to_ascii_lowercase();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }

    Some(
        base.chars()
            .map(|c| if c.is_control() || c == '\\' { '_' } else { c })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_restricted() {
        assert_eq!(validate_session_id("upload_abc-1.2").unwrap(), "upload_abc-1.2");
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id(".hidden").is_err());
    }
}
