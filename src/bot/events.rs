use serenity::{async_trait, model::id::GuildId};
use songbird::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler};
use tracing::{debug, info, warn};

use crate::audio::player::{ConnectionEvents, PlaybackEvents};

/// Handler para cuando termina un track
pub struct TrackEndHandler {
    pub guild_id: GuildId,
    pub events: PlaybackEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!(
            "🎵 Track terminó en guild {} (gen {})",
            self.guild_id,
            self.events.generation()
        );

        // El avance puede tardar (yt-dlp), no bloquear el driver de voz
        let events = self.events.clone();
        tokio::spawn(async move { events.finished().await });

        None
    }
}

/// Handler para errores de tracks
pub struct TrackErrorHandler {
    pub guild_id: GuildId,
    pub events: PlaybackEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let reason = match ctx {
            EventContext::Track(track_list) => track_list
                .first()
                .map(|(state, _handle)| format!("{:?}", state.playing))
                .unwrap_or_else(|| "unknown playback error".to_string()),
            _ => "unknown playback error".to_string(),
        };
        warn!("❌ Error en track para guild {}: {}", self.guild_id, reason);

        let events = self.events.clone();
        tokio::spawn(async move { events.failed(reason).await });

        None
    }
}

/// Handler para desconexiones del driver de voz
pub struct DriverDisconnectHandler {
    pub guild_id: GuildId,
    pub events: ConnectionEvents,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            );
        }

        // El controlador puede tener el lock tomado durante `play`
        let events = self.events.clone();
        tokio::spawn(async move { events.lost().await });

        None
    }
}

/// Handler para reconexiones del driver de voz
pub struct DriverReconnectHandler {
    pub guild_id: GuildId,
    pub events: ConnectionEvents,
}

#[async_trait]
impl VoiceEventHandler for DriverReconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🔄 Driver de voz reconectado en guild {}", self.guild_id);

        let events = self.events.clone();
        tokio::spawn(async move { events.restored().await });

        None
    }
}
