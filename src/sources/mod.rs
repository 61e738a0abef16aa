pub mod ytdl;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::item::PlayableItem;

pub use ytdl::YtDlpResolver;

/// Result of a successful resolution.
#[derive(Debug)]
pub enum Resolved {
    Track(PlayableItem),
    Playlist { name: String, items: Vec<PlayableItem> },
}

impl Resolved {
    /// The single item to use when only one is wanted (notifications).
    pub fn into_first(self) -> Option<PlayableItem> {
        match self {
            Resolved::Track(item) => Some(item),
            Resolved::Playlist { items, .. } => items.into_iter().next(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No matches found for: {0}")]
    NoMatch(String),

    #[error("Failed to load {identifier}: {reason}")]
    Failed { identifier: String, reason: String },
}

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Turns a URL, search string or local path into playable items.
    async fn resolve(&self, identifier: &str) -> Result<Resolved, ResolveError>;
}

/// Maps user input to a resolver identifier: URLs pass through, anything
/// else becomes a YouTube search.
pub fn query_identifier(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("{}{}", ytdl::SEARCH_PREFIX, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::item::ItemSource;

    #[test]
    fn urls_pass_through_and_text_becomes_search() {
        assert_eq!(
            query_identifier("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(query_identifier("  never gonna give "), "ytsearch:never gonna give");
    }

    #[test]
    fn into_first_takes_head_of_playlist() {
        let items = vec![
            PlayableItem::new(ItemSource::Remote("https://a".into()), "a"),
            PlayableItem::new(ItemSource::Remote("https://b".into()), "b"),
        ];
        let first = Resolved::Playlist { name: "mix".into(), items }.into_first();
        assert_eq!(first.map(|i| i.title().to_string()), Some("a".into()));

        let empty = Resolved::Playlist { name: "empty".into(), items: Vec::new() };
        assert!(empty.into_first().is_none());
    }
}
