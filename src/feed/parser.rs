use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::ParsedArticle;
use crate::util::sanitize_title;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);

/// Parse RSS/Atom bytes into articles ready for storage.
///
/// Titles are sanitized ("Untitled" when nothing printable remains), links
/// other than http(s) are dropped, and entries without an id get a stable
/// SHA-256 guid derived from link, title and publish time.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedArticle>, ParseError> {
    let feed = parser::parse(bytes)?;

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| href.starts_with("http://") || href.starts_with("https://"));
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry
                .title
                .and_then(|t| sanitize_title(&t.content))
                .unwrap_or_else(|| "Untitled".to_string());

            let guid = generate_guid(&entry.id, url.as_deref(), &title, published);

            ParsedArticle {
                guid,
                title,
                url,
                published,
                summary,
            }
        })
        .collect();

    Ok(articles)
}

fn generate_guid(existing: &str, url: Option<&str>, title: &str, published: Option<i64>) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rss_items() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><guid>a-1</guid><title>First</title><link>https://example.com/1</link></item>
    <item><guid>a-2</guid><title>Second</title><link>javascript:alert(1)</link></item>
</channel></rss>"#;
        let articles = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].guid, "a-1");
        assert_eq!(articles[0].url.as_deref(), Some("https://example.com/1"));
        assert_eq!(articles[1].url, None);
    }

    #[test]
    fn test_guid_fallback_is_stable() {
        let a = generate_guid("", Some("https://example.com/x"), "X", Some(1));
        let b = generate_guid("  ", Some("https://example.com/x"), "X", Some(1));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_guid("", Some("https://example.com/x"), "X", Some(2)));
    }

    #[test]
    fn test_malformed_feed_errors() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }
}
