use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::{ResolutionError, Track, TrackOrigin, TrackResolver, YouTubeClient};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static SPOTIFY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:open\.spotify\.com/(?:intl-[a-zA-Z-]+/)?|spotify:)(track|album|playlist)[/:]([A-Za-z0-9]+)")
        .expect("spotify link regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyKind {
    Track,
    Album,
    Playlist,
}

/// Cliente de metadata de Spotify.
///
/// Spotify no entrega audio: cada track se reproduce a través de la mejor
/// coincidencia en YouTube, buscando "nombre artistas".
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
    youtube: Arc<YouTubeClient>,
    max_items: usize,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

impl SpotifyTrack {
    fn search_terms(&self) -> String {
        let artists: Vec<&str> = self.artists.iter().map(|a| a.name.as_str()).collect();
        if artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, artists.join(" "))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Page<SpotifyTrack>,
}

impl SpotifyClient {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        youtube: Arc<YouTubeClient>,
        max_items: usize,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
            youtube,
            max_items,
        }
    }

    pub fn is_spotify_link(query: &str) -> bool {
        query.contains("spotify.com") || query.starts_with("spotify:")
    }

    pub fn parse_link(query: &str) -> Option<(SpotifyKind, String)> {
        let captures = SPOTIFY_LINK.captures(query)?;
        let kind = match &captures[1] {
            "track" => SpotifyKind::Track,
            "album" => SpotifyKind::Album,
            _ => SpotifyKind::Playlist,
        };
        Some((kind, captures[2].to_string()))
    }

    async fn access_token(&self) -> Result<String, ResolutionError> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached {
            if token.expires_at > Utc::now() {
                return Ok(token.value);
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Renovar un minuto antes de que expire
        let lifetime = chrono::Duration::seconds((response.expires_in - 60).max(0));
        let token = CachedToken {
            value: response.access_token,
            expires_at: Utc::now() + lifetime,
        };
        let value = token.value.clone();
        *self.token.lock() = Some(token);

        Ok(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ResolutionError> {
        let token = self.access_token().await?;
        let value = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }

    /// Recorre la paginación de Spotify hasta `max_items`
    async fn collect_pages<T: serde::de::DeserializeOwned>(
        &self,
        first_url: String,
    ) -> Result<Vec<T>, ResolutionError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            if items.len() >= self.max_items {
                break;
            }
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.items);
            next = page.next;
        }

        items.truncate(self.max_items);
        Ok(items)
    }

    async fn metadata_for(&self, kind: SpotifyKind, id: &str) -> Result<Vec<SpotifyTrack>, ResolutionError> {
        match kind {
            SpotifyKind::Track => {
                let track: SpotifyTrack = self.get_json(&format!("{}/tracks/{}", API_BASE, id)).await?;
                Ok(vec![track])
            }
            SpotifyKind::Album => {
                self.collect_pages(format!("{}/albums/{}/tracks?limit=50", API_BASE, id))
                    .await
            }
            SpotifyKind::Playlist => {
                let items: Vec<PlaylistItem> = self
                    .collect_pages(format!("{}/playlists/{}/tracks?limit=100", API_BASE, id))
                    .await?;
                Ok(items.into_iter().filter_map(|item| item.track).collect())
            }
        }
    }

    /// Busca un track por texto en el catálogo de Spotify
    pub async fn search(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        let token = self.access_token().await?;
        let response: SearchResponse = self
            .http
            .get(format!("{}/search", API_BASE))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.match_on_youtube(response.tracks.items, requested_by).await
    }

    async fn match_on_youtube(
        &self,
        tracks: Vec<SpotifyTrack>,
        requested_by: UserId,
    ) -> Result<Vec<Track>, ResolutionError> {
        let mut resolved = Vec::with_capacity(tracks.len());

        for track in tracks {
            let terms = track.search_terms();
            match self.youtube.search_first(&terms, requested_by, TrackOrigin::Spotify).await {
                Ok(Some(found)) => resolved.push(found),
                Ok(None) => debug!("Sin coincidencia en YouTube para: {}", terms),
                Err(e) => warn!("⚠️ Búsqueda en YouTube falló para '{}': {}", terms, e),
            }
        }

        Ok(resolved)
    }
}

#[async_trait]
impl TrackResolver for SpotifyClient {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        let Some((kind, id)) = Self::parse_link(query) else {
            return self.search(query, requested_by).await;
        };

        info!("🟢 Resolviendo {:?} de Spotify: {}", kind, id);
        let metadata = self.metadata_for(kind, &id).await?;
        self.match_on_youtube(metadata, requested_by).await
    }
}
