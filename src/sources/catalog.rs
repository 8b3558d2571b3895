use async_trait::async_trait;
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ResolutionError, SpotifyClient, Track, TrackResolver, YouTubeClient};

/// Resolver principal: decide qué catálogo atiende cada consulta.
///
/// - enlaces de Spotify van a Spotify
/// - enlaces de YouTube van a YouTube
/// - texto libre busca en YouTube y, si no hay resultados, en Spotify
pub struct CatalogResolver {
    youtube: Arc<dyn TrackResolver>,
    spotify: Option<Arc<dyn TrackResolver>>,
}

impl CatalogResolver {
    pub fn new(youtube: Arc<dyn TrackResolver>, spotify: Option<Arc<dyn TrackResolver>>) -> Self {
        if spotify.is_none() {
            info!("🟡 Spotify sin credenciales, solo se usará YouTube");
        }
        Self { youtube, spotify }
    }
}

#[async_trait]
impl TrackResolver for CatalogResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, ResolutionError> {
        if SpotifyClient::is_spotify_link(query) {
            return match &self.spotify {
                Some(spotify) => spotify.resolve(query, requested_by).await,
                None => Err(ResolutionError::Lookup(
                    "Spotify links are not enabled on this bot".to_string(),
                )),
            };
        }

        if YouTubeClient::is_youtube_url(query) {
            return self.youtube.resolve(query, requested_by).await;
        }

        let tracks = self.youtube.resolve(query, requested_by).await?;
        if !tracks.is_empty() {
            return Ok(tracks);
        }

        match &self.spotify {
            Some(spotify) => {
                debug!("Sin resultados en YouTube, probando Spotify: {}", query);
                spotify.resolve(query, requested_by).await
            }
            None => Ok(tracks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockTrackResolver, TrackOrigin};

    fn track(title: &str, origin: TrackOrigin) -> Track {
        Track::new(title, format!("https://www.youtube.com/watch?v={}", title), origin, UserId::new(3))
    }

    #[tokio::test]
    async fn test_free_text_falls_back_to_spotify() {
        let mut youtube = MockTrackResolver::new();
        youtube.expect_resolve().times(1).returning(|_, _| Ok(Vec::new()));
        let mut spotify = MockTrackResolver::new();
        spotify
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(vec![track("matched", TrackOrigin::Spotify)]));

        let resolver = CatalogResolver::new(Arc::new(youtube), Some(Arc::new(spotify)));
        let tracks = resolver.resolve("obscure song", UserId::new(3)).await.unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].origin(), TrackOrigin::Spotify);
    }

    #[tokio::test]
    async fn test_youtube_link_never_reaches_spotify() {
        let mut youtube = MockTrackResolver::new();
        youtube.expect_resolve().times(1).returning(|_, _| Ok(Vec::new()));
        let mut spotify = MockTrackResolver::new();
        spotify.expect_resolve().never();

        let resolver = CatalogResolver::new(Arc::new(youtube), Some(Arc::new(spotify)));
        let tracks = resolver
            .resolve("https://youtu.be/dQw4w9WgXcQ", UserId::new(3))
            .await
            .unwrap();

        assert!(tracks.is_empty());
    }

    #[tokio::test]
    async fn test_spotify_link_without_credentials_is_an_error() {
        let mut youtube = MockTrackResolver::new();
        youtube.expect_resolve().never();

        let resolver = CatalogResolver::new(Arc::new(youtube), None);
        let result = resolver
            .resolve("https://open.spotify.com/track/abc", UserId::new(3))
            .await;

        assert!(matches!(result, Err(ResolutionError::Lookup(_))));
    }
}
