use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        player::{PlaybackError, PlaybackOutcome},
        queue::QueueError,
        registry::SessionRegistry,
    },
    sources::TrackResolver,
    ui::text::{format_queue, format_track_line},
};

/// Superficie de comandos independiente del transporte de chat.
///
/// Cada operación devuelve el texto de confirmación para el usuario; los
/// errores por guild nunca salen de aquí.
pub struct CommandService {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn TrackResolver>,
}

impl CommandService {
    pub fn new(registry: Arc<SessionRegistry>, resolver: Arc<dyn TrackResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn play(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        requested_by: UserId,
        query: &str,
    ) -> String {
        let query = query.trim();
        if query.is_empty() {
            return "Give me a link or something to search for.".to_string();
        }
        let Some(channel_id) = voice_channel else {
            return "Join a voice channel first.".to_string();
        };

        let tracks = match self.resolver.resolve(query, requested_by).await {
            Ok(tracks) if tracks.is_empty() => return "No matching tracks found.".to_string(),
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("🔍 No se pudo resolver '{}' en guild {}: {}", query, guild_id, e);
                return format!("Could not load that: {}", e);
            }
        };

        let ack = match tracks.as_slice() {
            [single] => format!("Queued: {}", single.title()),
            many => format!("Queued {} tracks.", many.len()),
        };

        let session = self.registry.get_or_create(guild_id);
        match session.controller.enqueue(tracks).await {
            Ok(added) => info!("➕ {} tracks encolados en guild {}", added, guild_id),
            Err(PlaybackError::Queue(QueueError::Full { limit })) => {
                session.controller.discard_if_unused().await;
                return format!("Queue limit ({}) exceeded.", limit);
            }
            Err(e) => return closing_or(e),
        }

        match session.controller.start(channel_id).await {
            Ok(PlaybackOutcome::GaveUp) => {
                format!("{} Nothing in the queue could be played.", ack)
            }
            Ok(_) => ack,
            Err(PlaybackError::Connect(e)) => format!("Could not join your voice channel: {}", e),
            Err(e) => closing_or(e),
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> String {
        match self.registry.get(guild_id) {
            Some(session) if session.controller.pause().await => "Paused.".to_string(),
            _ => "Nothing is playing.".to_string(),
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> String {
        match self.registry.get(guild_id) {
            Some(session) if session.controller.resume().await => "Resumed.".to_string(),
            _ => "Nothing is paused.".to_string(),
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> String {
        let Some(session) = self.registry.get(guild_id) else {
            return "Nothing to skip.".to_string();
        };

        match session.controller.skip().await {
            PlaybackOutcome::Inactive => "Nothing to skip.".to_string(),
            PlaybackOutcome::GaveUp => "Skipped. Nothing left could be played.".to_string(),
            PlaybackOutcome::Skipped(track) => format!("Skipped: {}", track.title()),
            _ => "Skipped.".to_string(),
        }
    }

    pub async fn stop(&self, guild_id: GuildId) -> String {
        match self.registry.get(guild_id) {
            Some(session) if session.controller.stop().await => {
                "Stopped and cleared the queue.".to_string()
            }
            _ => "Nothing is playing.".to_string(),
        }
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> String {
        let Some(session) = self.registry.get(guild_id) else {
            return "Nothing is playing.".to_string();
        };

        if session.controller.toggle_loop().await {
            "Loop is now enabled.".to_string()
        } else {
            "Loop is now disabled.".to_string()
        }
    }

    pub async fn leave(&self, guild_id: GuildId) -> String {
        match self.registry.get(guild_id) {
            Some(session) if session.controller.leave().await => {
                "Left the voice channel.".to_string()
            }
            _ => "Not connected.".to_string(),
        }
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> String {
        let Some(session) = self.registry.get(guild_id) else {
            return "Nothing is playing.".to_string();
        };

        match session.controller.now_playing().await {
            Some((track, true)) => format!("Paused: {}", format_track_line(&track)),
            Some((track, false)) => format!("Now playing: {}", format_track_line(&track)),
            None => "Nothing is playing.".to_string(),
        }
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> String {
        let Some(session) = self.registry.get(guild_id) else {
            return "Not enough tracks in the queue to shuffle.".to_string();
        };

        match session.controller.shuffle().await {
            0 | 1 => "Not enough tracks in the queue to shuffle.".to_string(),
            count => format!("Shuffled {} tracks.", count),
        }
    }

    /// `position` es la posición que muestra `queue`, empezando en 1
    pub async fn remove(&self, guild_id: GuildId, position: &str) -> String {
        let Some(session) = self.registry.get(guild_id) else {
            return "Queue is empty.".to_string();
        };
        let index = match position.trim().parse::<usize>() {
            Ok(position) if position >= 1 => position - 1,
            _ => return "Give me a queue position, like 2.".to_string(),
        };

        match session.controller.remove(index).await {
            Some(track) => format!("Removed: {}", track.title()),
            None => format!("There is no track at position {}.", index + 1),
        }
    }

    pub async fn inspect_queue(&self, guild_id: GuildId) -> String {
        match self.registry.get(guild_id) {
            Some(session) => format_queue(&session.controller.snapshot().await.queue),
            None => "Queue is empty.".to_string(),
        }
    }
}

fn closing_or(error: PlaybackError) -> String {
    match error {
        PlaybackError::SessionClosed => {
            "The previous session is still closing, try again in a moment.".to_string()
        }
        other => format!("Something went wrong: {}", other),
    }
}
