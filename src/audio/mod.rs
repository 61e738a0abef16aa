//! # Audio Module
//!
//! Per-guild track scheduling for desuu-prime.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - Ordered pending items, one lock for every operation including shuffle
//!
//! ### [`player`] - Playback Controller
//! - Single authority over what plays in a guild
//! - Queue advancement only happens on end-of-track events, so a skip and a
//!   natural end can never both pop the queue
//!
//! ### [`interrupt`] - Notifications
//! - Plays a short sound over the current track, then resumes the track at
//!   the position it was preempted
//!
//! ### [`session`] - Guild Sessions
//! - Lazily creates one controller (and backend) per guild
//!
//! ### [`songbird_backend`] - Voice Output
//! - [`backend::PlaybackBackend`] implemented on top of a songbird `Call`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # async fn example(registry: &SessionRegistry, guild_id: serenity::all::GuildId) {
//! let session = registry.session(guild_id);
//!
//! let outcome = session.play("ytsearch:lofi beats").await;
//! session.notify("beep.mp3").await;
//! session.skip();
//! # }
//! ```

pub mod backend;
pub mod interrupt;
pub mod item;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_backend;

#[cfg(test)]
pub(crate) mod testing;

pub use session::SessionRegistry;
