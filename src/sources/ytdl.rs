use async_trait::async_trait;
use reqwest::Client;
use songbird::input::{AuxMetadata, Compose, YoutubeDl};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{ResolveError, Resolved, Resolver};
use crate::audio::item::{ItemSource, PlayableItem};

pub const SEARCH_PREFIX: &str = "ytsearch:";

/// Resolver backed by yt-dlp (through songbird) and the local filesystem.
///
/// - `ytsearch:<text>`: first YouTube search result
/// - `http(s)://...`: metadata fetched by yt-dlp for that URL
/// - anything else (or `file://`): a local audio file
#[derive(Clone)]
pub struct YtDlpResolver {
    http: Client,
}

impl YtDlpResolver {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    async fn search(&self, query: &str) -> Result<Resolved, ResolveError> {
        let mut ytdl = YoutubeDl::new_search(self.http.clone(), query.to_string());
        let first = ytdl
            .search(Some(1))
            .await
            .map_err(|e| failed(query, e))?
            .next()
            .ok_or_else(|| ResolveError::NoMatch(query.to_string()))?;

        let url = first
            .source_url
            .clone()
            .ok_or_else(|| ResolveError::NoMatch(query.to_string()))?;
        info!("🔍 Búsqueda '{}' resuelta a {}", query, url);
        Ok(Resolved::Track(item_from_metadata(url, first)))
    }

    async fn remote(&self, url: &str) -> Result<Resolved, ResolveError> {
        let mut ytdl = YoutubeDl::new(self.http.clone(), url.to_string());
        let metadata = ytdl.aux_metadata().await.map_err(|e| failed(url, e))?;
        Ok(Resolved::Track(item_from_metadata(url.to_string(), metadata)))
    }

    async fn local(&self, identifier: &str) -> Result<Resolved, ResolveError> {
        let path = PathBuf::from(identifier.strip_prefix("file://").unwrap_or(identifier));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                let title = file_title(&path);
                Ok(Resolved::Track(PlayableItem::new(ItemSource::Local(path), title)))
            }
            Ok(_) => Err(ResolveError::NoMatch(identifier.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("📁 Archivo no encontrado: {}", path.display());
                Err(ResolveError::NoMatch(identifier.to_string()))
            }
            Err(e) => Err(failed(identifier, e)),
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, identifier: &str) -> Result<Resolved, ResolveError> {
        if let Some(query) = identifier.strip_prefix(SEARCH_PREFIX) {
            if query.trim().is_empty() {
                return Err(ResolveError::NoMatch(identifier.to_string()));
            }
            self.search(query.trim()).await
        } else if identifier.starts_with("http://") || identifier.starts_with("https://") {
            self.remote(identifier).await
        } else {
            self.local(identifier).await
        }
    }
}

fn item_from_metadata(url: String, metadata: AuxMetadata) -> PlayableItem {
    let title = metadata.title.unwrap_or_else(|| url.clone());
    let item = PlayableItem::new(ItemSource::Remote(url), title);
    match metadata.duration {
        Some(duration) => item.with_duration(duration),
        None => item,
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn failed(identifier: &str, error: impl std::fmt::Display) -> ResolveError {
    ResolveError::Failed {
        identifier: identifier.to_string(),
        reason: error.to_string(),
    }
}
