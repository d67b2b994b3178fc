//! Upload progress polling, clearing and live streaming.

use crate::error::ApiError;
use crate::models::MessageResponse;
use crate::progress::{PROGRESS_EVENT, ProgressEvent, ProgressHub, ProgressSnapshot, SessionChannels};
use crate::routes::params::require_session_id;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{Shutdown, State};
use rocket_okapi::openapi;
use std::sync::Arc;

/// Latest snapshot for a session, or the waiting snapshot if none exists.
#[openapi(tag = "Upload Progress")]
#[get("/upload/progress?<session_id>")]
pub async fn get_progress(
    session_id: Option<String>,
    progress: &State<ProgressHub>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let session_id = require_session_id(session_id)?;
    Ok(Json(progress.snapshot(&session_id).await?))
}

/// Forget a session's progress.
#[openapi(tag = "Upload Progress")]
#[delete("/upload/progress?<session_id>")]
pub async fn clear_progress(
    session_id: Option<String>,
    progress: &State<ProgressHub>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session_id = require_session_id(session_id)?;
    progress.forget(&session_id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Progress cleared".to_string(),
    }))
}

/// Server-sent `progress.updated` events, starting with the current snapshot
/// and ending after a terminal one.
#[get("/upload/progress/stream?<session_id>")]
pub async fn stream_progress(
    session_id: Option<String>,
    progress: &State<ProgressHub>,
    channels: &State<Arc<SessionChannels>>,
    mut shutdown: Shutdown,
) -> Result<EventStream![], ApiError> {
    let session_id = require_session_id(session_id)?;

    // Subscribe before reading so no update falls between the two.
    let mut rx = channels.subscribe(&session_id);
    let current = progress.snapshot(&session_id).await?;
    let initial = ProgressEvent::new(session_id, current);

    Ok(EventStream! {
        let finished = initial.is_terminal();
        yield Event::json(&initial).event(PROGRESS_EVENT);

        if !finished {
            loop {
                let event = select! {
                    received = rx.recv() => match received {
                        Ok(event) => event,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!("progress stream lagged by {} events", skipped);
                            continue;
                        }
                    },
                    _ = &mut shutdown => break,
                };

                let terminal = event.is_terminal();
                yield Event::json(&event).event(PROGRESS_EVENT);
                if terminal {
                    break;
                }
            }
        }
    })
}
