use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};
use tracing::{debug, info, warn};

use super::{
    backend::{EndReason, PlaybackBackend},
    interrupt::{Notification, ResumePoint},
    item::{ItemId, PlayableItem, TrackSummary},
    queue::TrackQueue,
};
use crate::sources::{ResolveError, Resolved, Resolver};

/// What the guild is doing right now.
#[derive(Debug)]
pub enum PlaybackState {
    Idle,
    Playing(PlayableItem),
    /// A notification preempts (or is about to preempt) the current item.
    InterruptedFor {
        notification: Notification,
        resume: Option<ResumePoint>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started,
    Queued { position: usize },
    /// First in line behind a notification that resumes nothing, so it
    /// starts as soon as the notification ends.
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Track { title: String, outcome: SubmitOutcome },
    Playlist { name: String, count: usize, started: bool },
    /// Resolved after the guild lost its voice connection.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    /// The backend was told to stop; the end event advances the queue.
    Stopped { title: String },
    /// A notification is playing; the interrupted track will not come back.
    ResumeDropped { title: String },
    NothingPlaying,
}

/// Read-only view of [`PlaybackState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSnapshot {
    Idle,
    Playing(TrackSummary),
    Interrupted {
        notification: Option<TrackSummary>,
        resume: Option<(TrackSummary, Duration)>,
    },
}

/// Single authority over what plays in one guild.
///
/// State and queue mutations happen under `state`; the queue lock is only
/// ever taken while `state` is held (or on its own for shuffle/snapshots).
/// Advancement happens exclusively in [`PlaybackController::on_item_end`].
pub struct PlaybackController {
    pub(super) guild_id: GuildId,
    pub(super) backend: Arc<dyn PlaybackBackend>,
    pub(super) resolver: Arc<dyn Resolver>,
    pub(super) queue: TrackQueue,
    pub(super) state: Mutex<PlaybackState>,
    pub(super) tickets: AtomicU64,
    load_order: tokio::sync::Mutex<()>,
}

impl PlaybackController {
    pub fn new(
        guild_id: GuildId,
        backend: Arc<dyn PlaybackBackend>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            guild_id,
            backend,
            resolver,
            queue: TrackQueue::new(),
            state: Mutex::new(PlaybackState::Idle),
            tickets: AtomicU64::new(0),
            load_order: tokio::sync::Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Resolves `identifier` and submits the result.
    ///
    /// Loads for one guild are resolved in call order, so two quick `/play`
    /// commands keep their order in the queue.
    pub async fn play(&self, identifier: &str) -> Result<PlayOutcome, ResolveError> {
        let _order = self.load_order.lock().await;
        let resolved = self.resolver.resolve(identifier).await.map_err(|e| {
            warn!("❌ Guild {}: no se pudo cargar {}: {}", self.guild_id, identifier, e);
            e
        })?;

        if !self.backend.is_connected() {
            warn!("🔌 Guild {} desconectada, descartando {}", self.guild_id, identifier);
            return Ok(PlayOutcome::Dropped);
        }

        Ok(match resolved {
            Resolved::Track(item) => {
                let title = item.title().to_string();
                PlayOutcome::Track { title, outcome: self.submit(item) }
            }
            Resolved::Playlist { name, items } => {
                if items.is_empty() {
                    return Err(ResolveError::NoMatch(identifier.to_string()));
                }
                let count = items.len();
                let started = self.submit_all(items);
                info!(
                    "📜 Playlist '{}' con {} tracks en guild {} ({} en cola)",
                    name,
                    count,
                    self.guild_id,
                    self.queue.len()
                );
                PlayOutcome::Playlist { name, count, started }
            }
        })
    }

    /// Starts `item` if idle, otherwise appends it to the queue.
    pub fn submit(&self, item: PlayableItem) -> SubmitOutcome {
        let mut state = self.state.lock();
        if matches!(*state, PlaybackState::Idle) {
            info!("🎵 Reproduciendo: {} (guild {})", item.title(), self.guild_id);
            self.backend.start(&item, false);
            *state = PlaybackState::Playing(item);
            SubmitOutcome::Started
        } else {
            let position = self.queue.enqueue(item);
            match &*state {
                PlaybackState::InterruptedFor { resume: None, .. } if position == 1 => {
                    SubmitOutcome::Next
                }
                _ => SubmitOutcome::Queued { position },
            }
        }
    }

    /// Submits a batch atomically. Returns whether the first item started.
    pub fn submit_all(&self, items: Vec<PlayableItem>) -> bool {
        let mut state = self.state.lock();
        let mut items = items.into_iter();
        let mut started = false;
        if matches!(*state, PlaybackState::Idle) {
            if let Some(first) = items.next() {
                info!("🎵 Reproduciendo: {} (guild {})", first.title(), self.guild_id);
                self.backend.start(&first, false);
                *state = PlaybackState::Playing(first);
                started = true;
            }
        }
        self.queue.enqueue_all(items);
        started
    }

    /// Stops the current item. The queue is advanced by the end event the
    /// backend emits for it, never here.
    pub fn skip(&self) -> SkipOutcome {
        let mut state = self.state.lock();
        match &mut *state {
            PlaybackState::Idle => SkipOutcome::NothingPlaying,
            PlaybackState::Playing(item) => {
                info!("⏭️ Saltando: {} (guild {})", item.title(), self.guild_id);
                self.backend.stop();
                SkipOutcome::Stopped { title: item.title().to_string() }
            }
            PlaybackState::InterruptedFor { notification, resume } => match resume.take() {
                Some(point) => {
                    info!(
                        "⏭️ Guild {}: {} no se reanudará tras la notificación",
                        self.guild_id,
                        point.item.title()
                    );
                    // Not taken over yet, so the interrupted item is still the output.
                    // Its end event finds no resume point and is ignored.
                    if matches!(notification, Notification::Pending { .. }) {
                        self.backend.stop();
                    }
                    SkipOutcome::ResumeDropped { title: point.item.title().to_string() }
                }
                None => SkipOutcome::NothingPlaying,
            },
        }
    }

    pub fn pause(&self) {
        self.backend.pause(true);
        info!("⏸️ Reproducción pausada (guild {})", self.guild_id);
    }

    pub fn resume(&self) {
        self.backend.pause(false);
        info!("▶️ Reproducción reanudada (guild {})", self.guild_id);
    }

    pub fn shuffle(&self) {
        self.queue.shuffle();
    }

    /// Forgets everything: drains the queue, goes idle and stops output.
    /// End events for items that were playing become stale.
    pub fn disconnect(&self) -> usize {
        let mut state = self.state.lock();
        *state = PlaybackState::Idle;
        let drained = self.queue.drain().len();
        self.backend.stop();
        info!("⏹️ Guild {} detenida, {} tracks descartados", self.guild_id, drained);
        drained
    }

    /// End-of-track callback, delivered by the session's event pump.
    pub fn on_item_end(&self, ended: ItemId, reason: EndReason) {
        let mut state = self.state.lock();
        match &*state {
            PlaybackState::Idle => {
                debug!("Evento de fin obsoleto {} ({:?}) en guild idle", ended, reason);
            }
            PlaybackState::Playing(current) if current.id() != ended => {
                debug!("Evento de fin obsoleto {} ({:?}), actual {}", ended, reason, current.id());
            }
            PlaybackState::Playing(current) => {
                if !reason.may_start_next() {
                    debug!("{} reemplazado, sin avanzar", current.title());
                    return;
                }
                if reason == EndReason::LoadFailed {
                    warn!("❌ Falló la carga de {} (guild {})", current.title(), self.guild_id);
                }
                self.advance(&mut state);
            }
            PlaybackState::InterruptedFor { .. } => self.interrupted_item_end(&mut state, ended, reason),
        }
    }

    /// Starts the next queued item, or goes idle.
    pub(super) fn advance(&self, state: &mut PlaybackState) {
        *state = match self.queue.dequeue_next() {
            Some(next) => {
                info!("🎵 Reproduciendo: {} (guild {})", next.title(), self.guild_id);
                self.backend.start(&next, false);
                PlaybackState::Playing(next)
            }
            None => {
                info!("📭 Cola vacía en guild {}", self.guild_id);
                PlaybackState::Idle
            }
        };
    }

    pub fn status(&self) -> StatusSnapshot {
        match &*self.state.lock() {
            PlaybackState::Idle => StatusSnapshot::Idle,
            PlaybackState::Playing(item) => StatusSnapshot::Playing(item.summary()),
            PlaybackState::InterruptedFor { notification, resume } => StatusSnapshot::Interrupted {
                notification: match notification {
                    Notification::Playing(item) => Some(item.summary()),
                    Notification::Pending { .. } => None,
                },
                resume: resume.as_ref().map(|point| (point.item.summary(), point.position)),
            },
        }
    }

    pub fn queue_snapshot(&self) -> Vec<TrackSummary> {
        self.queue.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{remote_item, BackendCall, RecordingBackend};
    use crate::sources::MockResolver;
    use pretty_assertions::assert_eq;

    fn controller(backend: &Arc<RecordingBackend>, resolver: MockResolver) -> PlaybackController {
        PlaybackController::new(GuildId::new(1), backend.clone(), Arc::new(resolver))
    }

    fn playing_id(controller: &PlaybackController) -> Option<ItemId> {
        match controller.status() {
            StatusSnapshot::Playing(summary) => Some(summary.id),
            _ => None,
        }
    }

    #[test]
    fn submit_when_idle_starts_immediately() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();

        assert_eq!(player.submit(a), SubmitOutcome::Started);
        assert_eq!(playing_id(&player), Some(a_id));
        assert_eq!(backend.calls(), vec![BackendCall::start(a_id, false)]);
    }

    #[test]
    fn submit_when_playing_appends_and_leaves_current() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        player.submit(a);

        assert_eq!(player.submit(remote_item("B")), SubmitOutcome::Queued { position: 1 });
        assert_eq!(player.submit(remote_item("C")), SubmitOutcome::Queued { position: 2 });

        assert_eq!(playing_id(&player), Some(a_id));
        let queued: Vec<_> = player.queue_snapshot().into_iter().map(|s| s.title).collect();
        assert_eq!(queued, vec!["B", "C"]);
        assert_eq!(backend.start_count(), 1);
    }

    #[test]
    fn natural_end_advances_then_goes_idle() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        let b = remote_item("B");
        let b_id = b.id();
        player.submit(a);
        player.submit(b);

        player.on_item_end(a_id, EndReason::Finished);
        assert_eq!(playing_id(&player), Some(b_id));

        player.on_item_end(b_id, EndReason::Finished);
        assert_eq!(player.status(), StatusSnapshot::Idle);
        assert_eq!(backend.start_count(), 2);
    }

    #[test]
    fn replaced_end_does_not_advance() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        player.submit(a);
        player.submit(remote_item("B"));

        player.on_item_end(a_id, EndReason::Replaced);

        assert_eq!(playing_id(&player), Some(a_id));
        assert_eq!(player.queue_snapshot().len(), 1);
    }

    #[test]
    fn load_failure_advances_like_any_end() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        let b = remote_item("B");
        let b_id = b.id();
        player.submit(a);
        player.submit(b);

        player.on_item_end(a_id, EndReason::LoadFailed);

        assert_eq!(playing_id(&player), Some(b_id));
    }

    #[test]
    fn skip_only_stops_and_end_event_advances() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        let b = remote_item("B");
        let b_id = b.id();
        player.submit(a);
        player.submit(b);

        assert_eq!(player.skip(), SkipOutcome::Stopped { title: "A".into() });
        // Nothing popped yet
        assert_eq!(playing_id(&player), Some(a_id));
        assert_eq!(player.queue_snapshot().len(), 1);
        assert_eq!(backend.calls().last(), Some(&BackendCall::Stop));

        player.on_item_end(a_id, EndReason::Stopped);
        assert_eq!(playing_id(&player), Some(b_id));
    }

    #[test]
    fn skip_racing_natural_end_starts_exactly_one_item() {
        let backend = RecordingBackend::new();
        let player = Arc::new(controller(&backend, MockResolver::new()));
        let a = remote_item("A");
        let a_id = a.id();
        player.submit(a);
        player.submit(remote_item("B"));
        player.submit(remote_item("C"));

        // Natural end and skip's stop both report the end of A
        let skipper = {
            let player = Arc::clone(&player);
            std::thread::spawn(move || {
                player.skip();
                player.on_item_end(a_id, EndReason::Stopped);
            })
        };
        let natural = {
            let player = Arc::clone(&player);
            std::thread::spawn(move || player.on_item_end(a_id, EndReason::Finished))
        };
        skipper.join().unwrap();
        natural.join().unwrap();

        // One start for A plus exactly one for the advance
        assert_eq!(backend.start_count(), 2);
        let queued: Vec<_> = player.queue_snapshot().into_iter().map(|s| s.title).collect();
        assert_eq!(queued, vec!["C"]);
    }

    #[test]
    fn skip_when_idle_does_nothing() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        assert_eq!(player.skip(), SkipOutcome::NothingPlaying);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn pause_and_resume_are_forwarded() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        player.pause();
        player.resume();
        assert_eq!(
            backend.calls(),
            vec![BackendCall::Pause(true), BackendCall::Pause(false)]
        );
    }

    #[test]
    fn disconnect_drains_and_ignores_late_end() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let a = remote_item("A");
        let a_id = a.id();
        player.submit(a);
        player.submit(remote_item("B"));

        assert_eq!(player.disconnect(), 1);
        player.on_item_end(a_id, EndReason::Stopped);

        assert_eq!(player.status(), StatusSnapshot::Idle);
        assert_eq!(backend.start_count(), 1);
    }

    #[tokio::test]
    async fn play_resolves_and_submits() {
        let backend = RecordingBackend::new();
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|id| {
                assert_eq!(id.to_string(), "ytsearch:song");
                Ok(Resolved::Track(remote_item("Song")))
            });
        let player = controller(&backend, resolver);

        let outcome = player.play("ytsearch:song").await.unwrap();

        assert_eq!(
            outcome,
            PlayOutcome::Track { title: "Song".into(), outcome: SubmitOutcome::Started }
        );
        assert_eq!(backend.start_count(), 1);
    }

    #[tokio::test]
    async fn play_playlist_starts_first_and_queues_rest() {
        let backend = RecordingBackend::new();
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_| {
            Ok(Resolved::Playlist {
                name: "mix".into(),
                items: vec![remote_item("1"), remote_item("2"), remote_item("3")],
            })
        });
        let player = controller(&backend, resolver);

        let outcome = player.play("https://example.com/list").await.unwrap();

        assert_eq!(outcome, PlayOutcome::Playlist { name: "mix".into(), count: 3, started: true });
        let queued: Vec<_> = player.queue_snapshot().into_iter().map(|s| s.title).collect();
        assert_eq!(queued, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn play_failure_leaves_state_untouched() {
        let backend = RecordingBackend::new();
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .returning(|id| Err(ResolveError::NoMatch(id.to_string())));
        let player = controller(&backend, resolver);

        let err = player.play("ytsearch:nothing").await.unwrap_err();

        assert_eq!(err, ResolveError::NoMatch("ytsearch:nothing".into()));
        assert_eq!(player.status(), StatusSnapshot::Idle);
        assert!(player.queue_snapshot().is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn play_after_disconnect_is_dropped() {
        let backend = RecordingBackend::new();
        backend.set_connected(false);
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_| Ok(Resolved::Track(remote_item("Late"))));
        let player = controller(&backend, resolver);

        assert_eq!(player.play("ytsearch:late").await.unwrap(), PlayOutcome::Dropped);
        assert_eq!(player.status(), StatusSnapshot::Idle);
    }

    #[test]
    fn end_to_end_shuffle_never_touches_the_playing_track() {
        let backend = RecordingBackend::new();
        let player = controller(&backend, MockResolver::new());
        let t1 = remote_item("T1");
        let t1_id = t1.id();

        assert_eq!(player.submit(t1), SubmitOutcome::Started);
        player.submit(remote_item("T2"));
        player.submit(remote_item("T3"));

        player.shuffle();
        assert_eq!(playing_id(&player), Some(t1_id));
        let mut queued: Vec<_> = player.queue_snapshot().into_iter().map(|s| s.title).collect();
        let head = queued[0].clone();
        queued.sort();
        assert_eq!(queued, vec!["T2", "T3"]);

        player.skip();
        player.on_item_end(t1_id, EndReason::Stopped);

        match player.status() {
            StatusSnapshot::Playing(summary) => assert_eq!(summary.title, head),
            other => panic!("expected playing, got {other:?}"),
        }
        assert_eq!(player.queue_snapshot().len(), 1);
    }
}
