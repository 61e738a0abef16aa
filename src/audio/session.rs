use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    backend::{PlaybackBackend, TrackEndReceiver, TrackEndSender},
    player::PlaybackController,
};
use crate::sources::Resolver;

/// Builds the audio backend for a guild the first time it is used.
pub trait BackendFactory: Send + Sync {
    fn create(&self, guild_id: GuildId, events: TrackEndSender) -> Arc<dyn PlaybackBackend>;
}

/// Guild id → playback controller.
///
/// Sessions are created lazily and live for the rest of the process.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<PlaybackController>>,
    backends: Arc<dyn BackendFactory>,
    resolver: Arc<dyn Resolver>,
}

impl SessionRegistry {
    pub fn new(backends: Arc<dyn BackendFactory>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            sessions: DashMap::new(),
            backends,
            resolver,
        }
    }

    /// Gets or creates the session for `guild_id`. Must run inside a tokio
    /// runtime: creating a session spawns its event pump.
    pub fn session(&self, guild_id: GuildId) -> Arc<PlaybackController> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| self.spawn_session(guild_id))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackController>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    fn spawn_session(&self, guild_id: GuildId) -> Arc<PlaybackController> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let backend = self.backends.create(guild_id, events_tx);
        let controller = Arc::new(PlaybackController::new(
            guild_id,
            backend,
            Arc::clone(&self.resolver),
        ));
        tokio::spawn(pump_track_ends(Arc::clone(&controller), events_rx));
        info!("🆕 Sesión creada para guild {}", guild_id);
        controller
    }
}

/// Delivers end events to the controller one at a time.
async fn pump_track_ends(controller: Arc<PlaybackController>, mut events: TrackEndReceiver) {
    while let Some(end) = events.recv().await {
        debug!("🏁 Guild {}: fin de {} ({:?})", controller.guild_id(), end.item, end.reason);
        controller.on_item_end(end.item, end.reason);
    }
    debug!("Canal de eventos cerrado para guild {}", controller.guild_id());
}
