//! Fakes shared by the scheduler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use super::{
    backend::PlaybackBackend,
    item::{ItemId, ItemSource, PlayableItem},
};
use crate::sources::{ResolveError, Resolved, Resolver};

pub fn remote_item(title: &str) -> PlayableItem {
    PlayableItem::new(ItemSource::Remote(format!("https://example.com/{title}")), title)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start {
        item: ItemId,
        start_at: Duration,
        takeover: bool,
    },
    Stop,
    Pause(bool),
}

impl BackendCall {
    pub fn start(item: ItemId, takeover: bool) -> Self {
        BackendCall::Start { item, start_at: Duration::ZERO, takeover }
    }
}

/// Backend that only records what it was asked to do.
#[derive(Debug)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    connected: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, BackendCall::Start { .. }))
            .count()
    }
}

impl PlaybackBackend for RecordingBackend {
    fn start(&self, item: &PlayableItem, takeover: bool) {
        self.calls.lock().push(BackendCall::Start {
            item: item.id(),
            start_at: item.start_at(),
            takeover,
        });
    }

    fn stop(&self) {
        self.calls.lock().push(BackendCall::Stop);
    }

    fn pause(&self, paused: bool) {
        self.calls.lock().push(BackendCall::Pause(paused));
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Resolver that holds every resolution until [`GatedResolver::release`].
pub struct GatedResolver {
    title: String,
    gate: Semaphore,
    calls: AtomicUsize,
    no_match: bool,
}

impl GatedResolver {
    pub fn new(title: &str) -> Arc<Self> {
        Arc::new(Self {
            title: title.to_string(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            no_match: false,
        })
    }

    /// Same gate, but every resolution ends in `NoMatch`.
    pub fn no_match(title: &str) -> Arc<Self> {
        Arc::new(Self {
            title: title.to_string(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            no_match: true,
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for GatedResolver {
    async fn resolve(&self, identifier: &str) -> Result<Resolved, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|e| ResolveError::Failed {
            identifier: self.title.clone(),
            reason: e.to_string(),
        })?;
        permit.forget();
        if self.no_match {
            return Err(ResolveError::NoMatch(identifier.to_string()));
        }
        Ok(Resolved::Track(remote_item(&self.title)))
    }
}
