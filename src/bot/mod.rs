//! # Bot Module
//!
//! Discord glue for Guild Jukebox.
//!
//! - [`commands`]: transport-agnostic command surface returning acknowledgements
//! - [`handlers`]: prefix command parsing and dispatch
//! - [`voice`]: [`VoiceTransport`](crate::audio::transport::VoiceTransport) over songbird
//! - [`events`]: songbird event handlers forwarding track and driver events
//! - [`announcer`]: posts session notices to the guild's last used text channel
//!
//! The [`JukeboxBot`] struct implements Serenity's [`EventHandler`] and only
//! reads messages; every per-guild decision lives in the audio module.

use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod announcer;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod voice;

use crate::config::Config;
use announcer::ChannelAnnouncer;
use commands::CommandService;

pub struct JukeboxBot {
    config: Arc<Config>,
    commands: Arc<CommandService>,
    announcer: Arc<ChannelAnnouncer>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        commands: Arc<CommandService>,
        announcer: Arc<ChannelAnnouncer>,
    ) -> Self {
        Self {
            config,
            commands,
            announcer,
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("⌨️ Prefijo de comandos: {}", self.config.command_prefix);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = handlers::parse_command(&self.config.command_prefix, &msg.content)
        else {
            return;
        };

        self.announcer.remember(guild_id, msg.channel_id);

        // La referencia al cache no puede cruzar un await
        let voice_channel = ctx.cache.guild(guild_id).and_then(|guild| {
            guild
                .voice_states
                .get(&msg.author.id)
                .and_then(|state| state.channel_id)
        });

        let reply = handlers::dispatch(
            &self.commands,
            &self.config.command_prefix,
            guild_id,
            voice_channel,
            msg.author.id,
            command,
        )
        .await;

        if let Err(e) = msg.reply(&ctx.http, reply).await {
            error!("Error respondiendo en guild {}: {:?}", guild_id, e);
        }
    }
}
