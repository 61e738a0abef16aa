use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{File, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    backend::{EndReason, PlaybackBackend, TrackEnd, TrackEndSender},
    item::{ItemId, ItemSource, PlayableItem, PositionCell},
    session::BackendFactory,
};

const POSITION_INTERVAL: Duration = Duration::from_millis(250);

/// Builds a [`SongbirdBackend`] per guild.
pub struct SongbirdBackends {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdBackends {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self { manager, http, volume }
    }
}

impl BackendFactory for SongbirdBackends {
    fn create(&self, guild_id: GuildId, events: TrackEndSender) -> Arc<dyn PlaybackBackend> {
        Arc::new(SongbirdBackend::spawn(
            guild_id,
            Arc::clone(&self.manager),
            self.http.clone(),
            self.volume,
            events,
        ))
    }
}

enum BackendCommand {
    Start {
        item: ItemId,
        title: String,
        source: ItemSource,
        start_at: Duration,
        position: PositionCell,
        takeover: bool,
    },
    Stop,
    Pause(bool),
}

/// Why the backend itself ended a track, and whether its end was reported.
#[derive(Debug, Default)]
struct EndIntent {
    reason: Mutex<Option<EndReason>>,
    reported: AtomicBool,
}

impl EndIntent {
    fn intend(&self, reason: EndReason) {
        self.reason.lock().get_or_insert(reason);
    }

    fn intended(&self) -> Option<EndReason> {
        *self.reason.lock()
    }
}

struct ActiveTrack {
    item: ItemId,
    handle: TrackHandle,
    ending: Arc<EndIntent>,
}

type SharedActive = Arc<Mutex<Option<ActiveTrack>>>;

/// Songbird output for one guild.
///
/// Commands are queued to a driver task that owns the songbird side, so
/// the [`PlaybackBackend`] methods never wait on the voice call lock.
pub struct SongbirdBackend {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    commands: mpsc::UnboundedSender<BackendCommand>,
    active: SharedActive,
}

impl SongbirdBackend {
    pub fn spawn(
        guild_id: GuildId,
        manager: Arc<Songbird>,
        http: reqwest::Client,
        volume: f32,
        events: TrackEndSender,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let active: SharedActive = Arc::default();
        let driver = BackendDriver {
            guild_id,
            manager: Arc::clone(&manager),
            http,
            volume,
            events,
            active: Arc::clone(&active),
        };
        tokio::spawn(driver.run(rx));
        Self {
            guild_id,
            manager,
            commands,
            active,
        }
    }

    fn send(&self, command: BackendCommand) {
        if self.commands.send(command).is_err() {
            error!("❌ Driver de audio detenido para guild {}", self.guild_id);
        }
    }
}

impl PlaybackBackend for SongbirdBackend {
    fn start(&self, item: &PlayableItem, takeover: bool) {
        self.send(BackendCommand::Start {
            item: item.id(),
            title: item.title().to_string(),
            source: item.source().clone(),
            start_at: item.start_at(),
            position: item.position_cell(),
            takeover,
        });
    }

    fn stop(&self) {
        self.send(BackendCommand::Stop);
    }

    fn pause(&self, paused: bool) {
        self.send(BackendCommand::Pause(paused));
    }

    fn is_playing(&self) -> bool {
        self.active.lock().is_some()
    }

    fn is_connected(&self) -> bool {
        self.manager.get(self.guild_id).is_some()
    }
}

struct BackendDriver {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
    events: TrackEndSender,
    active: SharedActive,
}

impl BackendDriver {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<BackendCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                BackendCommand::Start {
                    item,
                    title,
                    source,
                    start_at,
                    position,
                    takeover,
                } => {
                    self.start(item, title, source, start_at, position, takeover)
                        .await
                }
                BackendCommand::Stop => self.end_active(EndReason::Stopped),
                BackendCommand::Pause(paused) => self.pause(paused),
            }
        }
        debug!("Driver de audio finalizado para guild {}", self.guild_id);
    }

    async fn start(
        &self,
        item: ItemId,
        title: String,
        source: ItemSource,
        start_at: Duration,
        position: PositionCell,
        takeover: bool,
    ) {
        if self.active.lock().is_some() && !takeover {
            warn!("⚠️ Guild {}: {} reemplaza una pista activa", self.guild_id, title);
        }
        self.end_active(EndReason::Replaced);

        let Some(call) = self.manager.get(self.guild_id) else {
            warn!("🔌 Guild {} sin llamada de voz, no se puede reproducir {}", self.guild_id, title);
            report(&self.events, item, &EndIntent::default(), EndReason::LoadFailed);
            return;
        };

        let input: Input = match source {
            ItemSource::Remote(url) => YoutubeDl::new(self.http.clone(), url).into(),
            ItemSource::Local(path) => File::new(path).into(),
        };

        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };
        let _ = handle.set_volume(self.volume);
        if !start_at.is_zero() {
            let _ = handle.seek(start_at);
        }

        let ending = Arc::new(EndIntent::default());
        let notifier = TrackEndNotifier {
            item,
            ending: Arc::clone(&ending),
            events: self.events.clone(),
            active: Arc::clone(&self.active),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                // Already over before we could listen for it
                debug!("No se pudo registrar {:?} para {}: {:?}", event, title, e);
                report(&self.events, item, &ending, EndReason::Finished);
                return;
            }
        }
        if let Err(e) = handle.add_event(Event::Periodic(POSITION_INTERVAL, None), PositionTracker(position)) {
            debug!("Sin seguimiento de posición para {}: {:?}", title, e);
        }

        info!("▶️ Guild {}: reproduciendo {} ({})", self.guild_id, title, item);
        *self.active.lock() = Some(ActiveTrack { item, handle, ending });
    }

    /// Stops the active track, recording why so its end event carries it.
    fn end_active(&self, reason: EndReason) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.ending.intend(reason);
        if let Err(e) = active.handle.stop() {
            // No end event will come for a track songbird already dropped
            debug!("Pista {} ya detenida: {:?}", active.item, e);
            report(&self.events, active.item, &active.ending, reason);
        }
    }

    fn pause(&self, paused: bool) {
        let active = self.active.lock();
        let Some(active) = active.as_ref() else {
            return;
        };
        let result = if paused { active.handle.pause() } else { active.handle.play() };
        if let Err(e) = result {
            warn!("⚠️ No se pudo cambiar la pausa de {}: {:?}", active.item, e);
        }
    }
}

fn report(events: &TrackEndSender, item: ItemId, ending: &EndIntent, reason: EndReason) {
    if ending.reported.swap(true, Ordering::AcqRel) {
        return;
    }
    if events.send(TrackEnd { item, reason }).is_err() {
        debug!("Sesión cerrada, fin de {} descartado", item);
    }
}

/// Handler para cuando termina (o falla) una canción
#[derive(Clone)]
struct TrackEndNotifier {
    item: ItemId,
    ending: Arc<EndIntent>,
    events: TrackEndSender,
    active: SharedActive,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let errored = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .any(|(state, _)| matches!(state.playing, PlayMode::Errored(_))),
            _ => false,
        };
        let reason = if errored {
            EndReason::LoadFailed
        } else {
            self.ending.intended().unwrap_or(EndReason::Finished)
        };

        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|a| a.item == self.item) {
                *active = None;
            }
        }

        report(&self.events, self.item, &self.ending, reason);
        None
    }
}

/// Publishes the live position of a track into its item.
struct PositionTracker(PositionCell);

#[async_trait]
impl VoiceEventHandler for PositionTracker {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            if let Some((state, _)) = tracks.first() {
                self.0.set(state.position);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backend(events: TrackEndSender) -> SongbirdBackend {
        SongbirdBackend::spawn(
            GuildId::new(3),
            Songbird::serenity(),
            reqwest::Client::new(),
            0.5,
            events,
        )
    }

    #[tokio::test]
    async fn start_without_voice_call_reports_load_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = backend(tx);
        let item = PlayableItem::new(ItemSource::Local("beep.mp3".into()), "beep");

        assert!(!backend.is_connected());
        backend.start(&item, true);

        let end = rx.recv().await.unwrap();
        assert_eq!(end, TrackEnd { item: item.id(), reason: EndReason::LoadFailed });
        assert!(!backend.is_playing());
    }

    #[tokio::test]
    async fn stop_with_nothing_active_reports_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = backend(tx);

        backend.stop();
        backend.pause(true);
        let item = PlayableItem::new(ItemSource::Local("beep.mp3".into()), "beep");
        backend.start(&item, false);

        // Commands are processed in order, so the only event is the failed start
        assert_eq!(rx.recv().await.unwrap().item, item.id());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn end_is_reported_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ending = EndIntent::default();
        let item = PlayableItem::new(ItemSource::Local("a.mp3".into()), "a");

        ending.intend(EndReason::Replaced);
        ending.intend(EndReason::Stopped);
        report(&tx, item.id(), &ending, ending.intended().unwrap());
        report(&tx, item.id(), &ending, EndReason::Finished);

        assert_eq!(rx.try_recv().unwrap().reason, EndReason::Replaced);
        assert!(rx.try_recv().is_err());
    }
}
