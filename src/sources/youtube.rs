use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use songbird::input::{HttpRequest, Input};
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AudioStream, CodecTag, ResolutionError, StreamError, StreamSource, Track, TrackOrigin,
    TrackResolver,
};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/|playlist\?)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("youtube url regex")
});

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    http: reqwest::Client,
    // Limitar procesos yt-dlp concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    max_playlist_size: usize,
    timeout: Duration,
}

/// Información extraída de yt-dlp (`--dump-json`, con o sin `--flat-playlist`)
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
}

enum YtDlpFailure {
    Timeout(Duration),
    Io(std::io::Error),
    Exit(String),
}

impl From<YtDlpFailure> for ResolutionError {
    fn from(failure: YtDlpFailure) -> Self {
        match failure {
            YtDlpFailure::Timeout(limit) => ResolutionError::Timeout(limit),
            YtDlpFailure::Io(e) => ResolutionError::Lookup(format!("yt-dlp could not start: {e}")),
            YtDlpFailure::Exit(stderr) => ResolutionError::Lookup(stderr),
        }
    }
}

impl From<YtDlpFailure> for StreamError {
    fn from(failure: YtDlpFailure) -> Self {
        match failure {
            YtDlpFailure::Timeout(limit) => StreamError::Timeout(limit),
            YtDlpFailure::Io(e) => StreamError::Io(e),
            YtDlpFailure::Exit(stderr) => StreamError::Unavailable(stderr),
        }
    }
}

/// Forma de la consulta recibida por el resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Video,
    Playlist,
    Search,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, max_playlist_size: usize, timeout: Duration) -> Self {
        Self {
            http,
            rate_limiter: Semaphore::new(3),
            max_playlist_size,
            timeout,
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    fn classify(query: &str) -> QueryKind {
        if !Self::is_youtube_url(query) {
            return QueryKind::Search;
        }

        let Ok(parsed) = Url::parse(query) else {
            return QueryKind::Video;
        };

        let has_video = parsed.host_str() == Some("youtu.be")
            || parsed.query_pairs().any(|(k, _)| k == "v");
        let has_list = parsed.query_pairs().any(|(k, _)| k == "list");

        if !has_video && has_list {
            QueryKind::Playlist
        } else {
            QueryKind::Video
        }
    }

    /// Busca el primer resultado en YouTube
    pub async fn search_first(
        &self,
        query: &str,
        requested_by: UserId,
        origin: TrackOrigin,
    ) -> Result<Option<Track>, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--flat-playlist", "--skip-download", search_query.as_str()])
            .await?;

        Ok(Self::parse_entries(&stdout).into_iter().next().and_then(|entry| {
            Self::entry_to_track(entry, requested_by, origin)
        }))
    }

    /// Obtiene información de una URL específica
    pub async fn get_video(&self, url: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self.run(&["--no-playlist", "--dump-json", url]).await?;
        let tracks = Self::parse_entries(&stdout)
            .into_iter()
            .filter_map(|entry| Self::entry_to_track(entry, requested_by, TrackOrigin::YouTube))
            .take(1)
            .collect();

        Ok(tracks)
    }

    /// Obtiene los videos de una playlist
    pub async fn get_playlist(&self, url: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);

        let limit = self.max_playlist_size.to_string();
        let stdout = self
            .run(&["--flat-playlist", "--dump-json", "--playlist-end", limit.as_str(), url])
            .await?;

        let tracks: Vec<Track> = Self::parse_entries(&stdout)
            .into_iter()
            .filter_map(|entry| Self::entry_to_track(entry, requested_by, TrackOrigin::YouTube))
            .collect();

        info!("📋 Playlist con {} tracks", tracks.len());
        Ok(tracks)
    }

    /// Obtiene la URL directa de audio
    pub async fn get_stream_url(&self, url: &str) -> Result<String, StreamError> {
        debug!("🎵 Obteniendo URL de stream para: {}", url);

        let stdout = self
            .run(&["--no-playlist", "-f", "bestaudio/best", "--get-url", url])
            .await?;

        let stream_url = stdout.lines().next().unwrap_or_default().trim().to_string();
        if stream_url.is_empty() {
            return Err(StreamError::Unavailable("yt-dlp returned no stream url".to_string()));
        }

        Ok(stream_url)
    }

    /// Verifica que yt-dlp esté disponible y funcional
    pub async fn verify_available() -> anyhow::Result<String> {
        let output = Command::new("yt-dlp").arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String, YtDlpFailure> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| YtDlpFailure::Exit(e.to_string()))?;

        let started = Instant::now();
        let mut command = Command::new("yt-dlp");
        command.args(args).arg("--no-warnings").kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(YtDlpFailure::Io)?,
            Err(_) => {
                warn!("⏰ yt-dlp excedió {:?}", self.timeout);
                return Err(YtDlpFailure::Timeout(self.timeout));
            }
        };

        debug!("yt-dlp terminó en {:?}", started.elapsed());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().last().unwrap_or("yt-dlp failed").trim().to_string();
            return Err(YtDlpFailure::Exit(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_entries(stdout: &str) -> Vec<YtDlpEntry> {
        stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
            .collect()
    }

    fn entry_to_track(entry: YtDlpEntry, requested_by: UserId, origin: TrackOrigin) -> Option<Track> {
        let locator = entry
            .webpage_url
            .or_else(|| entry.url.filter(|u| u.starts_with("http")))
            .or_else(|| entry.id.map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;

        let title = entry.title.unwrap_or_else(|| locator.clone());
        let mut track = Track::new(title, locator, origin, requested_by);

        if let Some(seconds) = entry.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }

        Some(track)
    }

    fn codec_of(stream_url: &str) -> CodecTag {
        Url::parse(stream_url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "mime")
                    .map(|(_, v)| CodecTag::from_mime(&v))
            })
            .unwrap_or(CodecTag::Unknown)
    }
}

#[async_trait]
impl TrackResolver for YouTubeClient {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        match Self::classify(query) {
            QueryKind::Video => self.get_video(query, requested_by).await,
            QueryKind::Playlist => self.get_playlist(query, requested_by).await,
            QueryKind::Search => Ok(self
                .search_first(query, requested_by, TrackOrigin::YouTube)
                .await?
                .into_iter()
                .collect()),
        }
    }
}

#[async_trait]
impl StreamSource for YouTubeClient {
    async fn open(&self, locator: &str) -> Result<AudioStream, StreamError> {
        let stream_url = self.get_stream_url(locator).await?;
        let codec = Self::codec_of(&stream_url);

        info!("🎧 Stream obtenido ({}) para {}", codec, locator);
        let input = Input::from(HttpRequest::new(self.http.clone(), stream_url));

        Ok(AudioStream::new(input, codec))
    }
}
