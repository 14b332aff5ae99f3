use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

// --- Backend wire contract ---

/// Runtime configuration served by `GET /env`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EnvConfig {
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "REDIRECT_URI")]
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Success body of both `/auth/token` and `/auth/refresh`. Every field is
/// optional on the wire so a malformed body can be told apart from a
/// transport failure.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
}

/// Error body returned by the backend on any non-success status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl BackendErrorBody {
    pub fn message(&self) -> String {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Tokens issued by a successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: SystemTime,
}

impl SessionTokens {
    /// `expires_at` is always issuance time plus `expires_in`.
    pub fn issued_now(access_token: String, refresh_token: Option<String>, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: SystemTime::now() + Duration::from_secs(expires_in),
        }
    }

    pub fn is_usable(&self, margin: Duration) -> bool {
        is_usable(self.expires_at, margin)
    }
}

/// `now < expires_at - margin`
pub fn is_usable(expires_at: SystemTime, margin: Duration) -> bool {
    match expires_at.checked_sub(margin) {
        Some(deadline) => SystemTime::now() < deadline,
        None => false,
    }
}

// --- Provider Web API ---

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub album: Album,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn image_url(&self) -> Option<&str> {
        self.album.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PlaybackContext {
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Body of `GET /me/player`: the provider's globally shared playback state.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CurrentPlayback {
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default)]
    pub context: Option<PlaybackContext>,
}

impl CurrentPlayback {
    pub fn device_id(&self) -> Option<&str> {
        self.device.as_ref().and_then(|d| d.id.as_deref())
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.name.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Playlist {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistsPage {
    #[serde(default)]
    pub items: Vec<Playlist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// --- Local playback SDK ---

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TrackWindow {
    #[serde(default)]
    pub current_track: Option<Track>,
}

/// State reported by the local playback SDK session.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LocalPlayerState {
    #[serde(default)]
    pub paused: bool,
    #[serde(rename = "position", default)]
    pub position_ms: u64,
    #[serde(rename = "duration", default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub track_window: TrackWindow,
}

impl LocalPlayerState {
    pub fn current_track(&self) -> Option<&Track> {
        self.track_window.current_track.as_ref()
    }

    pub fn has_active_track(&self) -> bool {
        self.current_track().is_some()
    }
}

/// Immutable point-in-time read of playback, from either source.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub track: String,
    pub artists: String,
    pub album: String,
    pub image_url: Option<String>,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub active_device_id: Option<String>,
}

impl PlaybackSnapshot {
    const UNKNOWN_ALBUM: &'static str = "Unknown Album";

    fn album_name(track: &Track) -> String {
        if track.album.name.is_empty() {
            Self::UNKNOWN_ALBUM.to_string()
        } else {
            track.album.name.clone()
        }
    }

    pub fn from_remote(playback: &CurrentPlayback) -> Option<Self> {
        let track = playback.item.as_ref()?;
        Some(Self {
            track: track.name.clone(),
            artists: track.artist_names(),
            album: Self::album_name(track),
            image_url: track.image_url().map(str::to_string),
            progress_ms: playback.progress_ms.unwrap_or(0),
            duration_ms: track.duration_ms,
            is_playing: playback.is_playing,
            active_device_id: playback.device_id().map(str::to_string),
        })
    }

    pub fn from_local(state: &LocalPlayerState, device_id: &str) -> Option<Self> {
        let track = state.current_track()?;
        Some(Self {
            track: track.name.clone(),
            artists: track.artist_names(),
            album: Self::album_name(track),
            image_url: track.image_url().map(str::to_string),
            progress_ms: state.position_ms,
            duration_ms: state.duration_ms,
            is_playing: !state.paused,
            active_device_id: Some(device_id.to_string()),
        })
    }

    pub fn progress_permille(&self) -> f64 {
        progress_permille(self.progress_ms, self.duration_ms)
    }
}

/// Position on the 0..=1000 progress scale. Zero when the duration is unknown.
pub fn progress_permille(position_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    ((position_ms as f64 / duration_ms as f64) * 1000.0).clamp(0.0, 1000.0)
}
