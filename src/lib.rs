//! Session and playback plumbing for a Spotify Web Playback client.
//!
//! The crate owns two jobs: keeping a PKCE-authorized token pair valid, and
//! keeping the "now playing" view coherent between the in-process SDK player
//! and the provider's remote playback state.
//!
//! # Logging
//!
//! This library uses the `tracing` crate for logging. To enable logs, you'll need to
//! initialize a tracing subscriber in your application.
//!
//! Example using `tracing_subscriber`:
//! ```no_run
//! use tracing::Level;
//! use tracing_subscriber::FmtSubscriber;
//!
//! // Create a subscriber with the desired log level
//! let subscriber = FmtSubscriber::builder()
//!     .with_max_level(Level::DEBUG) // Set to DEBUG, INFO, WARN, or ERROR
//!     .finish();
//!
//! // Initialize the global subscriber
//! tracing::subscriber::set_global_default(subscriber)
//!     .expect("Failed to set tracing subscriber");
//! ```
//!
//! The log levels control what information is displayed:
//! - `TRACE`: Cache hits, progress ticks and every Web API response status
//! - `DEBUG`: Refresh joins, state transitions and device targeting
//! - `INFO`: Redirects, exchanges, refreshes and playback hand-offs
//! - `WARN`: Skipped sync cycles and rejected tokens
//! - `ERROR`: Backend rejections and store failures

mod auth;
pub use auth::{
    authorization_url, AuthState, ChannelNavigator, LoggingNavigator, Navigator, TokenManager,
    AUTHORIZE_URL, SCOPES,
};
mod backend;
pub use backend::{AuthBackend, HttpAuthBackend};
mod bootstrap;
pub use bootstrap::{authenticate, Startup};
mod error;
pub use error::SessionError;
mod models;
pub use models::{
    is_usable, progress_permille, Album, Artist, BackendErrorBody, CodeExchangeRequest,
    CurrentPlayback, Device, DevicesResponse, EnvConfig, Image, LocalPlayerState,
    PlaybackContext, PlaybackSnapshot, Playlist, PlaylistsPage, RefreshRequest, SessionTokens,
    TokenResponse, Track, TrackWindow, UserProfile,
};
pub mod pkce;
mod player;
pub use player::{PlayerSdk, PlayerSession, StateNotifier};
mod reconciler;
pub use reconciler::{ControlOutcome, Library, PlaybackReconciler, SyncOutcome, UiState};
mod settings;
pub use settings::{Settings, SETTINGS};
mod store;
pub use store::{decode_instant, encode_instant, FileTokenStore, MemoryTokenStore, StoreKey, TokenStore};
mod web_api;
pub use web_api::{RemotePlayback, ResumeTarget, WebApiClient};
