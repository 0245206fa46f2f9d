//! Shared helpers: input hygiene and background task plumbing.
//!
//! - **URL validation**: feed URLs must be public http(s) endpoints
//! - **Text**: feed and folder titles are stripped of control sequences
//! - **Tasks**: panic capture for spawned background work

mod task;
mod text;
mod url_validator;

pub(crate) use task::catch_task_panic;
pub use text::{sanitize_title, strip_control_chars, MAX_TITLE_LENGTH};
pub use url_validator::{validate_feed_url, UrlValidationError};
