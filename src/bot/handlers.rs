use serenity::model::id::{ChannelId, GuildId, UserId};
use tracing::info;

use super::commands::CommandService;

/// Comando de texto ya interpretado
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    NowPlaying,
    Shuffle,
    Remove(String),
    Loop,
    Leave,
    Help,
}

/// Interpreta `content` como comando con `prefix`. Devuelve `None` para
/// mensajes normales y comandos desconocidos.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "play" | "p" => Command::Play(args.to_string()),
        "pause" => Command::Pause,
        "resume" | "r" => Command::Resume,
        "skip" | "s" => Command::Skip,
        "stop" => Command::Stop,
        "queue" | "q" => Command::Queue,
        "nowplaying" | "np" => Command::NowPlaying,
        "shuffle" => Command::Shuffle,
        "remove" => Command::Remove(args.to_string()),
        "loop" | "l" => Command::Loop,
        "leave" | "dc" | "disconnect" => Command::Leave,
        "help" => Command::Help,
        _ => return None,
    };
    Some(command)
}

pub fn help_text(prefix: &str) -> String {
    [
        ("play <url|search>", "queue a YouTube or Spotify link, or search"),
        ("pause", "pause the current track"),
        ("resume", "resume playback"),
        ("skip", "skip to the next track"),
        ("stop", "stop and clear the queue"),
        ("queue", "show the queue"),
        ("nowplaying", "show the current track"),
        ("shuffle", "shuffle the pending tracks"),
        ("remove <position>", "remove a track from the queue"),
        ("loop", "toggle repeating the current track"),
        ("leave", "leave the voice channel"),
    ]
    .iter()
    .map(|(usage, what)| format!("{}{} - {}", prefix, usage, what))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Ejecuta un comando y devuelve la respuesta para el canal
pub async fn dispatch(
    service: &CommandService,
    prefix: &str,
    guild_id: GuildId,
    voice_channel: Option<ChannelId>,
    author: UserId,
    command: Command,
) -> String {
    info!("📝 Comando {:?} de {} en guild {}", command, author, guild_id);

    match command {
        Command::Play(query) => service.play(guild_id, voice_channel, author, &query).await,
        Command::Pause => service.pause(guild_id).await,
        Command::Resume => service.resume(guild_id).await,
        Command::Skip => service.skip(guild_id).await,
        Command::Stop => service.stop(guild_id).await,
        Command::Queue => service.inspect_queue(guild_id).await,
        Command::NowPlaying => service.now_playing(guild_id).await,
        Command::Shuffle => service.shuffle(guild_id).await,
        Command::Remove(position) => service.remove(guild_id, &position).await,
        Command::Loop => service.toggle_loop(guild_id).await,
        Command::Leave => service.leave(guild_id).await,
        Command::Help => help_text(prefix),
    }
}
