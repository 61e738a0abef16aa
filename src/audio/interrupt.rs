//! Interrupt-and-resume: play a short notification over the current track,
//! then bring the track back at the position it was preempted.
//!
//! Lives on [`PlaybackController`] and shares its state lock, so a
//! notification can never race the queue advancement it suspends.

use std::{sync::atomic::Ordering, time::Duration};
use tracing::{debug, info, warn};

use super::{
    backend::EndReason,
    item::{ItemId, PlayableItem},
    player::{PlaybackController, PlaybackState},
};
use crate::sources::ResolveError;

/// Notification slot of an interrupted guild.
#[derive(Debug)]
pub enum Notification {
    /// Resolution in flight; `ticket` identifies this particular interrupt.
    Pending { ticket: u64 },
    Playing(PlayableItem),
}

/// Track to restore once the notification ends.
#[derive(Debug)]
pub struct ResumePoint {
    pub item: PlayableItem,
    pub position: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The notification took over the output.
    Playing { title: String },
    /// Another notification is already in progress.
    Busy,
    NotConnected,
    /// The notification could not be resolved; the previous state is back.
    Aborted(ResolveError),
    /// The guild was reset while resolving; nothing was started.
    Stale,
}

impl PlaybackController {
    /// Plays `identifier` over whatever is playing, then resumes it.
    pub async fn notify(&self, identifier: &str) -> NotifyOutcome {
        let ticket = {
            let mut state = self.state.lock();
            if !self.backend.is_connected() {
                debug!("Guild {} sin conexión de voz, notificación ignorada", self.guild_id);
                return NotifyOutcome::NotConnected;
            }
            if matches!(*state, PlaybackState::InterruptedFor { .. }) {
                debug!("Guild {} ya tiene una notificación en curso", self.guild_id);
                return NotifyOutcome::Busy;
            }

            let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
            let resume = match std::mem::replace(&mut *state, PlaybackState::Idle) {
                PlaybackState::Playing(item) => {
                    let position = item.position();
                    Some(ResumePoint { item, position })
                }
                _ => None,
            };
            *state = PlaybackState::InterruptedFor {
                notification: Notification::Pending { ticket },
                resume,
            };
            ticket
        };

        let resolved = self
            .resolver
            .resolve(identifier)
            .await
            .and_then(|r| r.into_first().ok_or_else(|| ResolveError::NoMatch(identifier.to_string())));

        let mut state = self.state.lock();
        let PlaybackState::InterruptedFor { notification, resume } = &mut *state else {
            debug!("Notificación {} obsoleta en guild {}", identifier, self.guild_id);
            return NotifyOutcome::Stale;
        };
        if !matches!(notification, Notification::Pending { ticket: t } if *t == ticket) {
            debug!("Notificación {} obsoleta en guild {}", identifier, self.guild_id);
            return NotifyOutcome::Stale;
        }

        match resolved {
            Ok(item) => {
                // The interrupted track kept playing while we resolved
                if let Some(point) = resume.as_mut() {
                    point.position = point.item.position();
                }
                let title = item.title().to_string();
                info!("🔔 Notificación '{}' en guild {}", title, self.guild_id);
                self.backend.start(&item, true);
                *notification = Notification::Playing(item);
                NotifyOutcome::Playing { title }
            }
            Err(e) => {
                warn!("🔕 Notificación abortada en guild {}: {}", self.guild_id, e);
                match resume.take() {
                    // Never stopped at the audio layer, only the intent is undone
                    Some(point) => *state = PlaybackState::Playing(point.item),
                    None => self.advance(&mut state),
                }
                NotifyOutcome::Aborted(e)
            }
        }
    }

    /// End event received while the guild is interrupted.
    pub(super) fn interrupted_item_end(
        &self,
        state: &mut PlaybackState,
        ended: ItemId,
        reason: EndReason,
    ) {
        let PlaybackState::InterruptedFor { notification, resume } = state else {
            return;
        };

        if matches!(notification, Notification::Playing(item) if item.id() == ended) {
            match resume.take() {
                Some(point) => {
                    let copy = point.item.copy_at(point.position);
                    info!(
                        "↩️ Reanudando {} en {} (guild {})",
                        copy.title(),
                        humantime::format_duration(point.position),
                        self.guild_id
                    );
                    self.backend.start(&copy, true);
                    *state = PlaybackState::Playing(copy);
                }
                None => self.advance(state),
            }
            return;
        }

        let interrupted_ended = resume.as_ref().is_some_and(|point| point.item.id() == ended);
        if !interrupted_ended {
            debug!("Evento de fin obsoleto {} ({:?}) durante notificación", ended, reason);
        } else if reason == EndReason::Replaced {
            debug!("{} suspendido por la notificación", ended);
        } else {
            // Ended on its own before the takeover, nothing to resume
            debug!("{} terminó durante la notificación ({:?})", ended, reason);
            *resume = None;
        }
    }
}
