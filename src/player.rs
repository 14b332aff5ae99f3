use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::trace;

use crate::models::LocalPlayerState;
use crate::SessionError;

/// Factory for the local in-process playback device.
///
/// Implemented by whatever embeds the provider's playback SDK. The returned
/// device id is the one the provider assigned to this session.
pub trait PlayerSdk: Send + Sync {
    fn create_session(
        &self,
        token: &str,
    ) -> BoxFuture<'static, Result<(String, Arc<dyn PlayerSession>), SessionError>>;
}

/// A live local playback device.
pub trait PlayerSession: Send + Sync {
    /// `None` when no track is loaded locally.
    fn current_state(&self) -> BoxFuture<'static, Option<LocalPlayerState>>;

    /// Volume in `0.0..=1.0`.
    fn volume(&self) -> BoxFuture<'static, f64>;

    fn set_volume(&self, volume: f64) -> BoxFuture<'static, Result<(), SessionError>>;

    fn toggle_play(&self) -> BoxFuture<'static, Result<(), SessionError>>;

    fn seek(&self, position_ms: u64) -> BoxFuture<'static, Result<(), SessionError>>;

    fn next_track(&self) -> BoxFuture<'static, Result<(), SessionError>>;

    fn previous_track(&self) -> BoxFuture<'static, Result<(), SessionError>>;

    /// Latest reported state. Intermediate values may be skipped; only the
    /// most recent one is ever observed.
    fn state_changes(&self) -> watch::Receiver<Option<LocalPlayerState>>;
}

/// Publishing side of [`PlayerSession::state_changes`].
///
/// SDK bindings push every state callback through here; subscribers that fall
/// behind see only the newest state.
#[derive(Debug)]
pub struct StateNotifier {
    tx: watch::Sender<Option<LocalPlayerState>>,
}

impl StateNotifier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, state: Option<LocalPlayerState>) {
        trace!(active = state.as_ref().is_some_and(|s| s.has_active_track()), "Local player state");
        self.tx.send_replace(state);
    }

    pub fn latest(&self) -> Option<LocalPlayerState> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LocalPlayerState>> {
        self.tx.subscribe()
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}
