//! HTTP route handlers grouped by resource domain.
//!
//! JSON handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! an OpenAPI document automatically. The multipart upload and the SSE stream
//! are mounted as plain Rocket routes.

pub mod contacts;
pub mod health;
pub mod params;
pub mod progress;
