mod articles;
mod channels;
mod preferences;
mod schema;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, ParsedArticle, SyncTarget};
