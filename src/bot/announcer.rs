use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::audio::notice::{Notice, NoticeSink};

/// Publica los avisos en el último canal de texto usado en cada guild
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn remember(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn channel_for(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|entry| *entry.value())
    }
}

#[async_trait]
impl NoticeSink for ChannelAnnouncer {
    async fn publish(&self, guild_id: GuildId, notice: Notice) {
        let Some(channel_id) = self.channel_for(guild_id) else {
            debug!("Sin canal de texto para guild {}, aviso descartado: {}", guild_id, notice);
            return;
        };

        if let Err(e) = channel_id.say(self.http.as_ref(), notice.to_string()).await {
            error!("Error enviando aviso a guild {}: {:?}", guild_id, e);
        }
    }
}
