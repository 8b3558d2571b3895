use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use super::player::{PlaybackController, PlaybackServices, PlaybackSettings};

/// Sesión de reproducción de un guild
pub struct Session {
    pub guild_id: GuildId,
    pub created_at: DateTime<Utc>,
    pub controller: Arc<PlaybackController>,
}

/// Mapa concurrente guild → sesión. Como máximo una sesión por guild.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    services: PlaybackServices,
    settings: PlaybackSettings,
}

impl SessionRegistry {
    pub fn new(services: PlaybackServices, settings: PlaybackSettings) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            services,
            settings,
        })
    }

    /// Devuelve la sesión del guild, creándola en Idle si no existe
    pub fn get_or_create(self: &Arc<Self>, guild_id: GuildId) -> Arc<Session> {
        let entry = self.sessions.entry(guild_id).or_insert_with(|| {
            info!("🆕 Nueva sesión para guild {}", guild_id);
            Arc::new(Session {
                guild_id,
                created_at: Utc::now(),
                controller: PlaybackController::new(
                    guild_id,
                    self.settings.clone(),
                    self.services.clone(),
                    Arc::downgrade(self),
                ),
            })
        });
        Arc::clone(&*entry)
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Quita la sesión solo si sigue siendo la de `controller`
    pub fn release(&self, guild_id: GuildId, controller: &PlaybackController) {
        let removed = self.sessions.remove_if(&guild_id, |_, session| {
            std::ptr::eq(Arc::as_ptr(&session.controller), controller)
        });
        match removed {
            Some((_, session)) => debug!(
                "🗑️ Sesión de guild {} eliminada (activa desde {})",
                guild_id,
                session.created_at.format("%H:%M:%S")
            ),
            None => debug!("Sesión de guild {} ya reemplazada, nada que eliminar", guild_id),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Cierra todas las sesiones (apagado del bot)
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        info!("🛑 Cerrando {} sesiones activas", sessions.len());
        join_all(sessions.iter().map(|session| session.controller.leave())).await;
        self.sessions.clear();
    }
}
