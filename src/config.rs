use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Sesiones
    pub auto_leave_delay: Duration,
    pub max_retry: u32,
    pub reconnect_grace: Duration,
    pub resolve_timeout: Duration,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            // Discord
            discord_token: non_empty("DISCORD_TOKEN").context("DISCORD_TOKEN is required")?,
            command_prefix: lookup("COMMAND_PREFIX").unwrap_or_else(|| "!".to_string()),

            // Cola
            max_queue_size: lookup("MAX_QUEUE_SIZE")
                .unwrap_or_else(|| "100".to_string())
                .parse()
                .context("MAX_QUEUE_SIZE")?,
            max_playlist_size: lookup("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|| "100".to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE")?,

            // Sesiones
            auto_leave_delay: humantime::parse_duration(
                &lookup("AUTO_LEAVE_DELAY").unwrap_or_else(|| "5m".to_string()),
            )
            .context("AUTO_LEAVE_DELAY")?,
            max_retry: lookup("MAX_RETRY")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("MAX_RETRY")?,
            reconnect_grace: humantime::parse_duration(
                &lookup("RECONNECT_GRACE").unwrap_or_else(|| "5s".to_string()),
            )
            .context("RECONNECT_GRACE")?,
            resolve_timeout: humantime::parse_duration(
                &lookup("RESOLVE_TIMEOUT").unwrap_or_else(|| "120s".to_string()),
            )
            .context("RESOLVE_TIMEOUT")?,

            // Spotify
            spotify_client_id: non_empty("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty("SPOTIFY_CLIENT_SECRET"),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue and playlist limits must be greater than 0
    /// - `MAX_RETRY` must be at least 1
    /// - The command prefix must not be empty
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_retry == 0 {
            anyhow::bail!("Max retry must be at least 1");
        }

        if self.auto_leave_delay.is_zero() {
            anyhow::bail!("Auto leave delay must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token or the Spotify secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Limits: {} queue, {} playlist, {} retries\n  \
            Timers: auto-leave {}, reconnect grace {}, resolve timeout {}\n  \
            Spotify: {}",
            self.command_prefix,
            self.max_queue_size,
            self.max_playlist_size,
            self.max_retry,
            humantime::format_duration(self.auto_leave_delay),
            humantime::format_duration(self.reconnect_grace),
            humantime::format_duration(self.resolve_timeout),
            if self.spotify_enabled() { "enabled" } else { "disabled" }
        )
    }
}
