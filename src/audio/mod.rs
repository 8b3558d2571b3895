//! # Audio Module
//!
//! Per-guild playback sessions for the jukebox.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`registry::Session`] per guild, created on demand
//! - Sessions remove themselves when they close
//!
//! ### [`player`] - Playback Controller
//! - State machine driving connect, acquire, play and advance
//! - Generation counter discards stale stream results and track callbacks
//! - Consecutive failures are bounded; the session gives up and leaves
//!
//! ### [`queue`] - Queue Management
//! - FIFO pending list plus the current slot
//! - Loop mode replays the current track
//!
//! ### [`auto_leave`] - Idle Timer
//! - Single cancellable deferred leave per session
//!
//! ### [`transport`] - Voice Layer Seam
//! - [`transport::VoiceTransport`] abstracts the voice gateway so the
//!   controller can be driven by fakes in tests
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = SessionRegistry::new(services, settings);
//! let session = registry.get_or_create(GuildId::new(123456789));
//!
//! session.controller.enqueue(tracks).await?;
//! session.controller.start(ChannelId::new(42)).await?;
//! session.controller.skip().await;
//! ```

pub mod auto_leave;
pub mod notice;
pub mod player;
pub mod queue;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;
