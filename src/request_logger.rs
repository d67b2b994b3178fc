use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let status = response.status();
        let elapsed_ms = duration.as_secs_f64() * 1000.0;

        if status.code >= 500 {
            log::warn!(
                "{} {} -> {} ({:.2}ms)",
                request.method(),
                request.uri(),
                status.code,
                elapsed_ms
            );
        } else if request.uri().path().as_str().starts_with("/api/v1/upload/progress") {
            // Progress polling is chatty.
            log::debug!(
                "{} {} -> {} ({:.2}ms)",
                request.method(),
                request.uri(),
                status.code,
                elapsed_ms
            );
        } else {
            log::info!(
                "{} {} -> {} ({:.2}ms)",
                request.method(),
                request.uri(),
                status.code,
                elapsed_ms
            );
        }
    }
}
