//! Feed retrieval for the local channel source.
//!
//! - [`parser`] turns RSS/Atom bytes into [`ParsedArticle`](crate::storage::ParsedArticle)s
//! - [`fetcher`] downloads a channel's feed with retries and stores the result

mod fetcher;
mod parser;

pub use fetcher::{build_client, sync_target, FetchError, FetchOptions};
pub use parser::{parse_feed, ParseError};
