use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{
    player::{PlaybackServices, PlaybackSettings},
    registry::SessionRegistry,
};
use crate::bot::{
    announcer::ChannelAnnouncer, commands::CommandService, voice::SongbirdTransport, JukeboxBot,
};
use crate::config::Config;
use crate::sources::{CatalogResolver, SpotifyClient, TrackResolver, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    match YouTubeClient::verify_available().await {
        Ok(version) => info!("✅ yt-dlp disponible: {}", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, la reproducción fallará: {:?}", e),
    }

    // Catálogos
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("guild-jukebox/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let youtube = Arc::new(YouTubeClient::new(
        http_client.clone(),
        config.max_playlist_size,
        config.resolve_timeout,
    ));
    let spotify: Option<Arc<dyn TrackResolver>> =
        match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => {
                info!("🟢 Spotify habilitado");
                let client: Arc<dyn TrackResolver> = Arc::new(SpotifyClient::new(
                    http_client,
                    id.clone(),
                    secret.clone(),
                    youtube.clone(),
                    config.max_playlist_size,
                ));
                Some(client)
            }
            _ => None,
        };
    let resolver: Arc<dyn TrackResolver> = Arc::new(CatalogResolver::new(youtube.clone(), spotify));

    // Voz y sesiones
    let songbird = Songbird::serenity();
    let announcer = Arc::new(ChannelAnnouncer::new(Arc::new(Http::new(&config.discord_token))));
    let services = PlaybackServices {
        streams: youtube,
        transport: Arc::new(SongbirdTransport::new(songbird.clone())),
        notices: announcer.clone(),
    };
    let registry = SessionRegistry::new(services, PlaybackSettings::from_config(&config));
    let commands = Arc::new(CommandService::new(registry.clone(), resolver));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = JukeboxBot::new(config.clone(), commands, announcer);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let version = YouTubeClient::verify_available().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
