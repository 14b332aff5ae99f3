use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::models::{CurrentPlayback, Device, DevicesResponse, Playlist, PlaylistsPage, UserProfile};
use crate::{SessionError, Settings};

const API_BASE: &str = "https://api.spotify.com/v1";

/// Where a resume should start: a context (playlist, album) positioned on a
/// track, or a bare track when there is no context.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeTarget {
    pub context_uri: Option<String>,
    pub track_uri: String,
    pub position_ms: u64,
}

impl ResumeTarget {
    fn body(&self) -> Value {
        match self.context_uri {
            Some(ref context_uri) => json!({
                "context_uri": context_uri,
                "offset": { "uri": self.track_uri },
                "position_ms": self.position_ms,
            }),
            None => json!({
                "uris": [self.track_uri],
                "position_ms": self.position_ms,
            }),
        }
    }
}

/// The provider's "current playback / devices" operations.
///
/// Every call takes the access token explicitly; the token may have become
/// invalid since it was acquired, which surfaces as
/// [`SessionError::Unauthorized`]. Other failures are
/// [`SessionError::UpstreamUnavailable`].
pub trait RemotePlayback: Send + Sync {
    /// `None` when nothing is playing anywhere (HTTP 204).
    fn current_playback(
        &self,
        token: &str,
    ) -> BoxFuture<'static, Result<Option<CurrentPlayback>, SessionError>>;

    fn devices(&self, token: &str) -> BoxFuture<'static, Result<Vec<Device>, SessionError>>;

    fn transfer_playback(
        &self,
        token: &str,
        device_id: &str,
        play: bool,
    ) -> BoxFuture<'static, Result<(), SessionError>>;

    /// `device_id: None` targets the currently active device.
    fn pause(
        &self,
        token: &str,
        device_id: Option<&str>,
    ) -> BoxFuture<'static, Result<(), SessionError>>;

    fn resume(
        &self,
        token: &str,
        device_id: Option<&str>,
        target: ResumeTarget,
    ) -> BoxFuture<'static, Result<(), SessionError>>;

    fn play_context(
        &self,
        token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> BoxFuture<'static, Result<(), SessionError>>;

    fn user_playlists(&self, token: &str)
        -> BoxFuture<'static, Result<Vec<Playlist>, SessionError>>;

    /// Profile lookup, used to check that a cached token is still accepted.
    fn current_user(&self, token: &str) -> BoxFuture<'static, Result<UserProfile, SessionError>>;
}

/// [`RemotePlayback`] over the provider's REST Web API.
#[derive(Debug, Clone)]
pub struct WebApiClient {
    client: Client,
    base_url: String,
}

impl WebApiClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self::new(client))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(context: &'static str, request: RequestBuilder) -> Result<reqwest::Response, SessionError> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::UpstreamUnavailable(format!("{context}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, context, "Web API call failed");
            return Err(SessionError::upstream(context, status, &body));
        }
        trace!(status = %response.status(), context, "Web API call succeeded");
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        context: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>, SessionError> {
        let response = Self::send(context, request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::UpstreamUnavailable(format!("{context}: {e}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn command(context: &'static str, request: RequestBuilder) -> Result<(), SessionError> {
        Self::send(context, request).await.map(|_| ())
    }
}

impl RemotePlayback for WebApiClient {
    fn current_playback(
        &self,
        token: &str,
    ) -> BoxFuture<'static, Result<Option<CurrentPlayback>, SessionError>> {
        let request = self.client.get(self.url("/me/player")).bearer_auth(token);
        Self::get_json::<CurrentPlayback>("current playback", request).boxed()
    }

    fn devices(&self, token: &str) -> BoxFuture<'static, Result<Vec<Device>, SessionError>> {
        let request = self
            .client
            .get(self.url("/me/player/devices"))
            .bearer_auth(token);
        async move {
            let response: Option<DevicesResponse> = Self::get_json("devices", request).await?;
            Ok(response.map(|r| r.devices).unwrap_or_default())
        }
        .boxed()
    }

    fn transfer_playback(
        &self,
        token: &str,
        device_id: &str,
        play: bool,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        debug!(device_id, play, "Transferring playback");
        let request = self
            .client
            .put(self.url("/me/player"))
            .bearer_auth(token)
            .json(&json!({ "device_ids": [device_id], "play": play }));
        Self::command("transfer playback", request).boxed()
    }

    fn pause(
        &self,
        token: &str,
        device_id: Option<&str>,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        let mut request = self
            .client
            .put(self.url("/me/player/pause"))
            .bearer_auth(token);
        if let Some(device_id) = device_id {
            request = request.query(&[("device_id", device_id)]);
        }
        Self::command("pause", request).boxed()
    }

    fn resume(
        &self,
        token: &str,
        device_id: Option<&str>,
        target: ResumeTarget,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        let mut request = self
            .client
            .put(self.url("/me/player/play"))
            .bearer_auth(token)
            .json(&target.body());
        if let Some(device_id) = device_id {
            request = request.query(&[("device_id", device_id)]);
        }
        Self::command("resume", request).boxed()
    }

    fn play_context(
        &self,
        token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        let request = self
            .client
            .put(self.url("/me/player/play"))
            .bearer_auth(token)
            .query(&[("device_id", device_id)])
            .json(&json!({ "context_uri": context_uri }));
        Self::command("play context", request).boxed()
    }

    fn user_playlists(
        &self,
        token: &str,
    ) -> BoxFuture<'static, Result<Vec<Playlist>, SessionError>> {
        let request = self.client.get(self.url("/me/playlists")).bearer_auth(token);
        async move {
            let page: Option<PlaylistsPage> = Self::get_json("playlists", request).await?;
            Ok(page.map(|p| p.items).unwrap_or_default())
        }
        .boxed()
    }

    fn current_user(&self, token: &str) -> BoxFuture<'static, Result<UserProfile, SessionError>> {
        let request = self.client.get(self.url("/me")).bearer_auth(token);
        async move {
            Self::get_json::<UserProfile>("current user", request)
                .await?
                .ok_or_else(|| SessionError::InvalidResponse("empty profile response".to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_body_prefers_context_with_offset() {
        let target = ResumeTarget {
            context_uri: Some("spotify:playlist:abc".to_string()),
            track_uri: "spotify:track:xyz".to_string(),
            position_ms: 42_000,
        };
        assert_eq!(
            target.body(),
            json!({
                "context_uri": "spotify:playlist:abc",
                "offset": { "uri": "spotify:track:xyz" },
                "position_ms": 42_000,
            })
        );
    }

    #[test]
    fn resume_body_without_context_plays_the_track() {
        let target = ResumeTarget {
            context_uri: None,
            track_uri: "spotify:track:xyz".to_string(),
            position_ms: 0,
        };
        assert_eq!(
            target.body(),
            json!({ "uris": ["spotify:track:xyz"], "position_ms": 0 })
        );
    }

    #[test]
    fn rejected_token_is_told_apart_from_outages() {
        let err = SessionError::upstream("current user", StatusCode::UNAUTHORIZED, "expired");
        assert!(matches!(err, SessionError::Unauthorized(_)));
        assert!(err.is_upstream());

        let err = SessionError::upstream("current user", StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, SessionError::UpstreamUnavailable(_)));
    }
}
