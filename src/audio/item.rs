use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identidad estable de un item reproducible.
///
/// Cada item resuelto y cada copia creada con [`PlayableItem::copy_at`]
/// recibe un id nuevo, así que los eventos de fin de pista se pueden
/// emparejar sin ambigüedad con el item que los produjo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the audio for an item comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    /// Remote URL, streamed through yt-dlp.
    Remote(String),
    /// File on the local filesystem.
    Local(PathBuf),
}

impl ItemSource {
    pub fn identifier(&self) -> String {
        match self {
            ItemSource::Remote(url) => url.clone(),
            ItemSource::Local(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for ItemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Playback position shared between an item and the backend playing it.
///
/// Stored in milliseconds; the backend writes, the scheduler reads.
#[derive(Debug, Clone, Default)]
pub struct PositionCell(Arc<AtomicU64>);

impl PositionCell {
    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, position: Duration) {
        let millis = u64::try_from(position.as_millis()).unwrap_or(u64::MAX);
        self.0.store(millis, Ordering::Relaxed);
    }
}

/// A resolved, ready-to-play audio unit.
///
/// Deliberately not `Clone`: an item lives in exactly one slot (queue, now
/// playing, resume point). Re-playing goes through [`PlayableItem::copy_at`].
#[derive(Debug)]
pub struct PlayableItem {
    id: ItemId,
    source: ItemSource,
    title: String,
    duration: Option<Duration>,
    start_at: Duration,
    position: PositionCell,
}

impl PlayableItem {
    pub fn new(source: ItemSource, title: impl Into<String>) -> Self {
        Self {
            id: ItemId::next(),
            source,
            title: title.into(),
            duration: None,
            start_at: Duration::ZERO,
            position: PositionCell::default(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    // Getters
    pub fn id(&self) -> ItemId {
        self.id
    }
    pub fn source(&self) -> &ItemSource {
        &self.source
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn start_at(&self) -> Duration {
        self.start_at
    }

    /// Last position reported by the backend.
    pub fn position(&self) -> Duration {
        self.position.get()
    }

    /// Handle the backend uses to publish the live position of this item.
    pub fn position_cell(&self) -> PositionCell {
        self.position.clone()
    }

    /// Produces an independent copy positioned at `position`.
    ///
    /// The copy gets a fresh id and its own position cell, so the original
    /// is left untouched if the copy is never played.
    pub fn copy_at(&self, position: Duration) -> PlayableItem {
        let copy = Self {
            id: ItemId::next(),
            source: self.source.clone(),
            title: self.title.clone(),
            duration: self.duration,
            start_at: position,
            position: PositionCell::default(),
        };
        copy.position.set(position);
        copy
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            title: self.title.clone(),
            source: self.source.identifier(),
            duration: self.duration,
            start_at: self.start_at,
        }
    }
}

/// Copy of an item's display data, safe to hand outside the scheduler lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub id: ItemId,
    pub title: String,
    pub source: String,
    pub duration: Option<Duration>,
    pub start_at: Duration,
}
