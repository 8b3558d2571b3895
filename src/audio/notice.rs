use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{fmt, sync::Arc};

use crate::{sources::Track, ui::text::format_track_line};

/// Aviso visible para los usuarios de un guild
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying(Arc<Track>),
    SkippingBroken { title: String, reason: String },
    GivingUp { failures: u32, reason: String },
    LoopDisabled { title: String },
    IdleTimeout,
    ConnectionLost,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NowPlaying(track) => write!(f, "Now playing: {}", format_track_line(track)),
            Notice::SkippingBroken { title, reason } => {
                write!(f, "Skipping broken track: {} ({})", title, reason)
            }
            Notice::GivingUp { failures, reason } => write!(
                f,
                "Giving up after {} failed tracks in a row ({}). Leaving the voice channel.",
                failures, reason
            ),
            Notice::LoopDisabled { title } => {
                write!(f, "{} failed, loop disabled.", title)
            }
            Notice::IdleTimeout => f.write_str("Left the voice channel due to inactivity."),
            Notice::ConnectionLost => f.write_str("Lost the voice connection. Leaving."),
        }
    }
}

/// Destino de los avisos. Los errores de entrega se registran, no se propagan.
#[async_trait]
pub trait NoticeSink: Send + Sync {
    async fn publish(&self, guild_id: GuildId, notice: Notice);
}
