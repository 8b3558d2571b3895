use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::{CoreEvent, Event as VoiceEvent, TrackEvent},
    tracks::TrackHandle,
    Songbird,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::events::{
    DriverDisconnectHandler, DriverReconnectHandler, TrackEndHandler, TrackErrorHandler,
};
use crate::{
    audio::{
        player::{ConnectionEvents, PlaybackEvents},
        transport::{TransportError, VoiceHandle, VoiceTransport},
    },
    sources::AudioStream,
};

/// [`VoiceTransport`] sobre songbird. Un track activo por guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            tracks: DashMap::new(),
        }
    }

    fn with_track<F>(&self, handle: &VoiceHandle, action: F) -> Result<(), TransportError>
    where
        F: FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>,
    {
        let track = self
            .tracks
            .get(&handle.guild_id)
            .ok_or(TransportError::NotConnected)?;
        action(&track).map_err(|e| TransportError::Control(e.to_string()))
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: ConnectionEvents,
    ) -> Result<VoiceHandle, TransportError> {
        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                warn!("Error al unirse al canal de voz en guild {}: {:?}", guild_id, e);
                if let Err(e) = self.manager.remove(guild_id).await {
                    debug!("Limpieza de llamada fallida (ignorado): {:?}", e);
                }
                return Err(TransportError::Join(e.to_string()));
            }
        };

        {
            let mut call = call.lock().await;
            call.remove_all_global_events();
            call.add_global_event(
                VoiceEvent::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectHandler {
                    guild_id,
                    events: events.clone(),
                },
            );
            call.add_global_event(
                VoiceEvent::Core(CoreEvent::DriverReconnect),
                DriverReconnectHandler { guild_id, events },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(VoiceHandle {
            guild_id,
            channel_id,
        })
    }

    async fn play(
        &self,
        handle: &VoiceHandle,
        stream: AudioStream,
        events: PlaybackEvents,
    ) -> Result<(), TransportError> {
        let call = self
            .manager
            .get(handle.guild_id)
            .ok_or(TransportError::NotConnected)?;

        let track = {
            let mut call = call.lock().await;
            call.stop();
            call.play_input(stream.input)
        };

        track
            .add_event(
                VoiceEvent::Track(TrackEvent::End),
                TrackEndHandler {
                    guild_id: handle.guild_id,
                    events: events.clone(),
                },
            )
            .map_err(|e| TransportError::Control(e.to_string()))?;
        track
            .add_event(
                VoiceEvent::Track(TrackEvent::Error),
                TrackErrorHandler {
                    guild_id: handle.guild_id,
                    events,
                },
            )
            .map_err(|e| TransportError::Control(e.to_string()))?;

        self.tracks.insert(handle.guild_id, track);
        Ok(())
    }

    fn pause(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        self.with_track(handle, |track| track.pause())
    }

    fn resume(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        self.with_track(handle, |track| track.play())
    }

    fn stop(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        match self.tracks.remove(&handle.guild_id) {
            Some((_, track)) => track
                .stop()
                .map_err(|e| TransportError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self, handle: VoiceHandle) -> Result<(), TransportError> {
        self.tracks.remove(&handle.guild_id);
        self.manager
            .remove(handle.guild_id)
            .await
            .map_err(|e| TransportError::Control(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", handle.guild_id);
        Ok(())
    }
}
