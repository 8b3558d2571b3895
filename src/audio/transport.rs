use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;

use super::player::{ConnectionEvents, PlaybackEvents};
use crate::sources::AudioStream;

/// Conexión de voz de un guild. Opaca para el controlador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not join voice channel: {0}")]
    Join(String),
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("voice control failed: {0}")]
    Control(String),
}

/// Capa de voz externa: conexión, entrega de audio y control de reproducción.
///
/// Las notificaciones de fin y error de un track se entregan a través de los
/// [`PlaybackEvents`] recibidos en `play`; las caídas de la conexión a través
/// de los [`ConnectionEvents`] recibidos en `connect`.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: ConnectionEvents,
    ) -> Result<VoiceHandle, TransportError>;

    async fn play(
        &self,
        handle: &VoiceHandle,
        stream: AudioStream,
        events: PlaybackEvents,
    ) -> Result<(), TransportError>;

    fn pause(&self, handle: &VoiceHandle) -> Result<(), TransportError>;

    fn resume(&self, handle: &VoiceHandle) -> Result<(), TransportError>;

    /// Detiene el track actual, si lo hay
    fn stop(&self, handle: &VoiceHandle) -> Result<(), TransportError>;

    async fn disconnect(&self, handle: VoiceHandle) -> Result<(), TransportError>;
}
