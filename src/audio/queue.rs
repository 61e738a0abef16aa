use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::item::{PlayableItem, TrackSummary};

/// Pending tracks of one guild.
///
/// Every operation takes the same lock, so a shuffle racing with
/// `enqueue`/`dequeue_next` can neither lose nor duplicate an item. Items
/// are moved in and out, never cloned.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: Mutex<VecDeque<PlayableItem>>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track and returns its 1-based position.
    pub fn enqueue(&self, item: PlayableItem) -> usize {
        let mut items = self.items.lock();
        info!("➕ Agregado a la cola: {}", item.title());
        items.push_back(item);
        items.len()
    }

    /// Agrega múltiples tracks (playlist) de una vez.
    pub fn enqueue_all(&self, batch: impl IntoIterator<Item = PlayableItem>) -> usize {
        let mut items = self.items.lock();
        let before = items.len();
        items.extend(batch);
        let added = items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn dequeue_next(&self) -> Option<PlayableItem> {
        let next = self.items.lock().pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola (FIFO): {}", item.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Mezcla la cola
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} canciones)", items.len());
    }

    /// Removes and returns everything, in order.
    pub fn drain(&self) -> Vec<PlayableItem> {
        let drained: Vec<_> = self.items.lock().drain(..).collect();
        if !drained.is_empty() {
            info!("🗑️ Cola vaciada: {} tracks removidos", drained.len());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn snapshot(&self) -> Vec<TrackSummary> {
        self.items.lock().iter().map(PlayableItem::summary).collect()
    }
}
