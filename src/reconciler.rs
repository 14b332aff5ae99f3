use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, Weak,
};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::auth::TokenManager;
use crate::models::{progress_permille, CurrentPlayback, Device, LocalPlayerState, PlaybackSnapshot, Playlist};
use crate::player::{PlayerSdk, PlayerSession};
use crate::web_api::{RemotePlayback, ResumeTarget};
use crate::{SessionError, Settings};

/// What the UI renders. Published through [`PlaybackReconciler::subscribe`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// `None` renders as "nothing playing".
    pub now_playing: Option<PlaybackSnapshot>,
    /// `0.0..=1000.0`
    pub progress_permille: f64,
    pub volume_percent: u8,
    pub paused: bool,
}

/// Result of a play/pause style user action. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    ToggledLocal,
    /// `device: None` means the command went to whatever device is active.
    PausedRemote { device: Option<String> },
    ResumedRemote { device: Option<String> },
    StartedPlaylist,
    NoActiveSession,
    NotAuthenticated,
}

/// Result of one background reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Rendered,
    SkippedInteraction,
    SkippedLocalDevice,
    NothingPlaying,
    NotAuthenticated,
    Unavailable,
}

/// Playlists and devices shown next to the player.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub playlists: Vec<Playlist>,
    pub devices: Vec<Device>,
}

struct ReconcilerInner {
    tokens: TokenManager,
    remote: Arc<dyn RemotePlayback>,
    session: Arc<dyn PlayerSession>,
    device_id: String,
    settings: Settings,
    ui_tx: watch::Sender<UiState>,
    progress_poller: Mutex<Option<JoinHandle<()>>>,
    // Number of user actions in flight.
    interacting: AtomicUsize,
}

/// Marks a user action as in progress so background sync stays out of its way.
struct InteractionGuard<'a>(&'a AtomicUsize);

impl<'a> InteractionGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for InteractionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps the displayed playback coherent between the local SDK session and
/// the provider's remote view, and routes user commands to the right one.
///
/// The local session wins whenever it has a track loaded. Remote state is
/// only consulted when it does not.
#[derive(Clone)]
pub struct PlaybackReconciler {
    inner: Arc<ReconcilerInner>,
}

impl PlaybackReconciler {
    pub fn new(
        tokens: TokenManager,
        remote: Arc<dyn RemotePlayback>,
        session: Arc<dyn PlayerSession>,
        device_id: String,
    ) -> Self {
        let settings = tokens.settings().clone();
        let (ui_tx, _) = watch::channel(UiState::default());
        Self {
            inner: Arc::new(ReconcilerInner {
                tokens,
                remote,
                session,
                device_id,
                settings,
                ui_tx,
                progress_poller: Mutex::new(None),
                interacting: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates the local session and moves playback onto it.
    ///
    /// `Ok(None)` when there is no token; an authorization redirect is
    /// already underway in that case.
    pub async fn attach(
        tokens: TokenManager,
        remote: Arc<dyn RemotePlayback>,
        sdk: &dyn PlayerSdk,
    ) -> Result<Option<Self>, SessionError> {
        let Some(token) = tokens.get_valid_token().await? else {
            return Ok(None);
        };
        let (device_id, session) = sdk.create_session(&token).await?;
        info!(%device_id, "Local player session ready");

        let reconciler = Self::new(tokens, remote, session, device_id);
        if let Err(e) = reconciler.hand_off().await {
            warn!(error = %e, "Could not transfer playback to the local device");
        }
        Ok(Some(reconciler))
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.inner.ui_tx.subscribe()
    }

    pub fn ui_state(&self) -> UiState {
        self.inner.ui_tx.borrow().clone()
    }

    /// Transfers playback to the local device, without starting it, unless
    /// the local device is already the active one. Returns whether a
    /// transfer was issued.
    pub async fn hand_off(&self) -> Result<bool, SessionError> {
        let inner = &self.inner;
        let Some(token) = inner.tokens.get_valid_token().await? else {
            return Ok(false);
        };

        let devices = inner.remote.devices(&token).await?;
        let active = devices.iter().find(|d| d.is_active);
        let already_local = active
            .and_then(|d| d.id.as_deref())
            .is_some_and(|id| id == inner.device_id);
        if already_local {
            debug!("Local device already active");
            return Ok(false);
        }

        info!(
            from = active.map(|d| d.name.as_str()),
            to = %inner.device_id,
            "Handing playback off to local device"
        );
        inner
            .remote
            .transfer_playback(&token, &inner.device_id, false)
            .await?;
        Ok(true)
    }

    /// Play/pause button.
    ///
    /// A locally loaded track is toggled in place without asking the remote
    /// side anything. Otherwise whatever the account is playing elsewhere is
    /// paused or resumed.
    pub async fn toggle_play_pause(&self) -> Result<ControlOutcome, SessionError> {
        let inner = &self.inner;
        let _interaction = InteractionGuard::enter(&inner.interacting);

        let Some(token) = inner.tokens.get_valid_token().await? else {
            return Ok(ControlOutcome::NotAuthenticated);
        };

        let local = inner.session.current_state().await;
        if local.as_ref().is_some_and(LocalPlayerState::has_active_track) {
            inner.session.toggle_play().await?;
            debug!("Toggled local playback");
            return Ok(ControlOutcome::ToggledLocal);
        }

        let Some(playback) = inner.remote.current_playback(&token).await? else {
            debug!("Nothing playing on any device");
            return Ok(ControlOutcome::NoActiveSession);
        };
        let Some(target) = resume_target(&playback) else {
            return Ok(ControlOutcome::NoActiveSession);
        };

        let device = self.remote_target(playback.device_id());
        if playback.is_playing {
            inner.remote.pause(&token, device.as_deref()).await?;
            info!(device = ?device, "Paused remote playback");
            self.update_ui(|ui| ui.paused = true);
            Ok(ControlOutcome::PausedRemote { device })
        } else {
            inner
                .remote
                .resume(&token, device.as_deref(), target)
                .await?;
            info!(device = ?device, "Resumed remote playback");
            self.update_ui(|ui| ui.paused = false);
            Ok(ControlOutcome::ResumedRemote { device })
        }
    }

    /// Play button: starts the selected playlist on the local device. With no
    /// playlist selected it toggles the local track, or resumes the account's
    /// last track here.
    pub async fn play_playlist(
        &self,
        context_uri: Option<&str>,
    ) -> Result<ControlOutcome, SessionError> {
        let inner = &self.inner;
        let _interaction = InteractionGuard::enter(&inner.interacting);

        let Some(token) = inner.tokens.get_valid_token().await? else {
            return Ok(ControlOutcome::NotAuthenticated);
        };

        if let Some(context_uri) = context_uri.filter(|uri| !uri.is_empty()) {
            inner
                .remote
                .play_context(&token, &inner.device_id, context_uri)
                .await?;
            info!(context_uri, "Started playlist on local device");
            return Ok(ControlOutcome::StartedPlaylist);
        }

        if inner.session.current_state().await.is_some() {
            inner.session.toggle_play().await?;
            return Ok(ControlOutcome::ToggledLocal);
        }

        let target = inner
            .remote
            .current_playback(&token)
            .await?
            .as_ref()
            .and_then(resume_target);
        match target {
            Some(target) => {
                inner
                    .remote
                    .resume(&token, Some(&inner.device_id), target)
                    .await?;
                Ok(ControlOutcome::ResumedRemote {
                    device: Some(inner.device_id.clone()),
                })
            }
            None => Ok(ControlOutcome::NoActiveSession),
        }
    }

    /// Applies one local state-change event. Only the latest event matters;
    /// each one with an active track restarts the progress poller and one
    /// without stops it.
    pub fn handle_local_state(&self, state: Option<LocalPlayerState>) {
        let Some(state) = state else {
            return;
        };

        if let Some(snapshot) = PlaybackSnapshot::from_local(&state, &self.inner.device_id) {
            self.update_ui(|ui| {
                ui.progress_permille = snapshot.progress_permille();
                ui.now_playing = Some(snapshot);
                ui.paused = state.paused;
            });
            self.restart_progress_poller();
        } else {
            self.stop_progress_poller();
            self.update_ui(|ui| ui.paused = state.paused);
        }
    }

    fn stop_progress_poller(&self) {
        let mut slot = self
            .inner
            .progress_poller
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            trace!("Progress poller stopped");
            previous.abort();
        }
    }

    fn restart_progress_poller(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.progress_poll_interval;

        let mut slot = self
            .inner
            .progress_poller
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if let Some(state) = inner.session.current_state().await {
                    let permille = progress_permille(state.position_ms, state.duration_ms);
                    trace!(permille, "Progress tick");
                    inner.ui_tx.send_if_modified(|ui| {
                        if ui.progress_permille != permille {
                            ui.progress_permille = permille;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        }));
    }

    /// Feeds every local state change into [`handle_local_state`](Self::handle_local_state).
    /// Ends when the session or the reconciler goes away.
    pub fn spawn_state_listener(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut changes = self.inner.session.state_changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = changes.borrow_and_update().clone();
                let Some(reconciler) = upgrade(&weak) else { break };
                reconciler.handle_local_state(state);
            }
            debug!("Local state listener stopped");
        })
    }

    /// One background reconciliation cycle against the remote view.
    pub async fn background_sync(&self) -> SyncOutcome {
        let inner = &self.inner;
        if inner.interacting.load(Ordering::SeqCst) > 0 {
            trace!("User interaction in progress, skipping background sync");
            return SyncOutcome::SkippedInteraction;
        }

        let token = match inner.tokens.get_valid_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return SyncOutcome::NotAuthenticated,
            Err(e) => {
                warn!(error = %e, "Background sync skipped");
                return SyncOutcome::Unavailable;
            }
        };

        let playback = match inner.remote.current_playback(&token).await {
            Ok(Some(playback)) => playback,
            Ok(None) => return SyncOutcome::NothingPlaying,
            Err(e) => {
                warn!(error = %e, "Background sync skipped");
                return SyncOutcome::Unavailable;
            }
        };

        if self.is_local_device(&playback) {
            trace!("Remote snapshot is the local device, leaving it to local events");
            return SyncOutcome::SkippedLocalDevice;
        }

        self.render_remote(&playback);
        SyncOutcome::Rendered
    }

    /// Runs [`background_sync`](Self::background_sync) on the configured
    /// period. The first cycle runs one period after the call.
    pub fn spawn_background_sync(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.background_poll_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(reconciler) = upgrade(&weak) else { break };
                let outcome = reconciler.background_sync().await;
                trace!(?outcome, "Background sync cycle");
            }
        })
    }

    /// Seeks the local track to `permille` of its duration. Returns `false`
    /// when nothing is loaded locally.
    pub async fn seek(&self, permille: f64) -> Result<bool, SessionError> {
        let inner = &self.inner;
        let _interaction = InteractionGuard::enter(&inner.interacting);

        let Some(state) = inner.session.current_state().await else {
            return Ok(false);
        };
        let permille = permille.clamp(0.0, 1000.0);
        let position_ms = (permille / 1000.0 * state.duration_ms as f64).round() as u64;
        inner.session.seek(position_ms).await?;
        debug!(position_ms, "Seeked local playback");
        self.update_ui(|ui| ui.progress_permille = permille);
        Ok(true)
    }

    pub async fn set_volume(&self, percent: u8) -> Result<(), SessionError> {
        let inner = &self.inner;
        let _interaction = InteractionGuard::enter(&inner.interacting);

        let percent = percent.min(100);
        inner.session.set_volume(f64::from(percent) / 100.0).await?;
        self.update_ui(|ui| ui.volume_percent = percent);
        Ok(())
    }

    /// Reads the session volume into the UI state.
    pub async fn load_volume(&self) -> u8 {
        let volume = self.inner.session.volume().await;
        let percent = (volume * 100.0).round().clamp(0.0, 100.0) as u8;
        self.update_ui(|ui| ui.volume_percent = percent);
        percent
    }

    pub async fn next_track(&self) -> Result<(), SessionError> {
        self.inner.session.next_track().await
    }

    pub async fn previous_track(&self) -> Result<(), SessionError> {
        self.inner.session.previous_track().await
    }

    /// Playlists and devices for the side panel. `Ok(None)` when not authenticated.
    pub async fn load_library(&self) -> Result<Option<Library>, SessionError> {
        let inner = &self.inner;
        let Some(token) = inner.tokens.get_valid_token().await? else {
            return Ok(None);
        };
        let playlists = inner.remote.user_playlists(&token).await?;
        let devices = inner.remote.devices(&token).await?;
        debug!(playlists = playlists.len(), devices = devices.len(), "Library loaded");
        Ok(Some(Library { playlists, devices }))
    }

    fn remote_target(&self, remote_device: Option<&str>) -> Option<String> {
        remote_device
            .filter(|id| *id != self.inner.device_id)
            .map(str::to_string)
    }

    fn is_local_device(&self, playback: &CurrentPlayback) -> bool {
        playback.device_id() == Some(self.inner.device_id.as_str())
            || playback.device_name() == Some(self.inner.settings.local_device_name.as_str())
    }

    fn render_remote(&self, playback: &CurrentPlayback) {
        let snapshot = PlaybackSnapshot::from_remote(playback);
        self.update_ui(|ui| {
            if let Some(ref snapshot) = snapshot {
                ui.progress_permille = snapshot.progress_permille();
                ui.paused = !snapshot.is_playing;
            }
            ui.now_playing = snapshot;
        });
    }

    fn update_ui(&self, apply: impl FnOnce(&mut UiState)) {
        self.inner.ui_tx.send_modify(apply);
    }
}

impl std::fmt::Debug for PlaybackReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackReconciler")
            .field("device_id", &self.inner.device_id)
            .field("interacting", &self.inner.interacting.load(Ordering::SeqCst))
            .finish()
    }
}

fn upgrade(weak: &Weak<ReconcilerInner>) -> Option<PlaybackReconciler> {
    weak.upgrade().map(|inner| PlaybackReconciler { inner })
}

fn resume_target(playback: &CurrentPlayback) -> Option<ResumeTarget> {
    let item = playback.item.as_ref()?;
    Some(ResumeTarget {
        context_uri: playback.context.as_ref().map(|c| c.uri.clone()),
        track_uri: item.uri.clone(),
        position_ms: playback.progress_ms.unwrap_or(0),
    })
}
