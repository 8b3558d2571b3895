//! # Sources Module
//!
//! Track metadata and audio stream acquisition for the playback core.
//!
//! The playback core never talks to a catalog directly. It consumes two
//! capability traits:
//!
//! - [`TrackResolver`] turns a user query (link or free text) into [`Track`] values
//! - [`StreamSource`] opens a playable [`AudioStream`] for a track locator
//!
//! Adapters:
//!
//! - [`youtube`] - yt-dlp backed YouTube lookups and streams
//! - [`spotify`] - Spotify Web API metadata, played through YouTube matches
//! - [`catalog`] - routing between both, following the `play` command rules

pub mod catalog;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use serenity::model::id::UserId;
use songbird::input::Input;
use std::{fmt, time::Duration};
use thiserror::Error;

pub use catalog::CatalogResolver;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Catálogo del que proviene un track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOrigin {
    YouTube,
    Spotify,
}

impl TrackOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackOrigin::YouTube => "youtube",
            TrackOrigin::Spotify => "spotify",
        }
    }
}

/// Un elemento reproducible. Inmutable una vez construido.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    locator: String,
    duration: Option<Duration>,
    origin: TrackOrigin,
    requested_by: UserId,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        locator: impl Into<String>,
        origin: TrackOrigin,
        requested_by: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            duration: None,
            origin,
            requested_by,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// URL o identificador que entiende el [`StreamSource`]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
}

/// Codec declarado por la fuente del stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecTag {
    Opus,
    Vorbis,
    Aac,
    Mp3,
    Unknown,
}

impl CodecTag {
    /// Deduce el codec a partir de un mime type (`audio/webm; codecs="opus"`)
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("opus") || mime.starts_with("audio/webm") {
            CodecTag::Opus
        } else if mime.contains("vorbis") || mime.starts_with("audio/ogg") {
            CodecTag::Vorbis
        } else if mime.starts_with("audio/mp4") || mime.contains("mp4a") || mime.contains("aac") {
            CodecTag::Aac
        } else if mime.starts_with("audio/mpeg") || mime.contains("mp3") {
            CodecTag::Mp3
        } else {
            CodecTag::Unknown
        }
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecTag::Opus => "opus",
            CodecTag::Vorbis => "vorbis",
            CodecTag::Aac => "aac",
            CodecTag::Mp3 => "mp3",
            CodecTag::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Stream de audio listo para entregar al transporte.
///
/// Pertenece al controlador durante un único track y se descarta después.
pub struct AudioStream {
    pub input: Input,
    pub codec: CodecTag,
}

impl AudioStream {
    pub fn new(input: Input, codec: CodecTag) -> Self {
        Self { input, codec }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("track unavailable: {0}")]
    Unavailable(String),
    #[error("stream acquisition timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not run extractor: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolución de consultas a tracks
///
/// Una consulta sin resultados devuelve un vector vacío, nunca un error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError>;
}

/// Apertura de streams de audio
///
/// Debe poder reintentarse sin efectos secundarios.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open(&self, locator: &str) -> Result<AudioStream, StreamError>;
}
