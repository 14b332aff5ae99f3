#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use url::Url;

use shadowfy_rs::{
    encode_instant, AuthBackend, ChannelNavigator, CodeExchangeRequest, CurrentPlayback, Device,
    EnvConfig, MemoryTokenStore, Playlist, RefreshRequest, RemotePlayback, ResumeTarget,
    SessionError, Settings, StoreKey, TokenManager, TokenResponse, TokenStore, UserProfile,
};

pub fn env_config() -> EnvConfig {
    EnvConfig {
        client_id: "client123".to_string(),
        redirect_uri: "http://localhost:8000/player".to_string(),
    }
}

pub fn token_response(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: Some(access.to_string()),
        refresh_token: refresh.map(str::to_string),
        expires_in,
    }
}

/// Backend double with call counters. Error outcomes are stored as messages
/// and turned into the matching `SessionError` variant on each call.
pub struct FakeBackend {
    pub env: Mutex<Result<EnvConfig, String>>,
    pub exchange: Mutex<Result<TokenResponse, String>>,
    pub refresh: Mutex<Result<TokenResponse, String>>,
    pub refresh_delay: Duration,
    pub env_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_exchange: Mutex<Option<CodeExchangeRequest>>,
    pub last_refresh: Mutex<Option<RefreshRequest>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            env: Mutex::new(Ok(env_config())),
            exchange: Mutex::new(Ok(token_response("access-1", Some("refresh-1"), 3600))),
            refresh: Mutex::new(Ok(token_response("access-2", None, 3600))),
            refresh_delay: Duration::from_millis(20),
            env_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_exchange: Mutex::new(None),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn with_refresh(self, outcome: Result<TokenResponse, String>) -> Self {
        *self.refresh.lock().unwrap() = outcome;
        self
    }

    pub fn with_exchange(self, outcome: Result<TokenResponse, String>) -> Self {
        *self.exchange.lock().unwrap() = outcome;
        self
    }

    pub fn with_env(self, outcome: Result<EnvConfig, String>) -> Self {
        *self.env.lock().unwrap() = outcome;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn env_calls(&self) -> usize {
        self.env_calls.load(Ordering::SeqCst)
    }
}

impl AuthBackend for FakeBackend {
    fn load_env(&self) -> BoxFuture<'static, Result<EnvConfig, SessionError>> {
        self.env_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.env.lock().unwrap().clone();
        async move { outcome.map_err(SessionError::ConfigurationUnavailable) }.boxed()
    }

    fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_exchange.lock().unwrap() = Some(request);
        let outcome = self.exchange.lock().unwrap().clone();
        async move { outcome.map_err(SessionError::ExchangeError) }.boxed()
    }

    fn refresh(
        &self,
        request: RefreshRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh.lock().unwrap() = Some(request);
        let outcome = self.refresh.lock().unwrap().clone();
        let delay = self.refresh_delay;
        async move {
            sleep(delay).await;
            outcome.map_err(SessionError::RefreshError)
        }
        .boxed()
    }
}

pub struct Harness {
    pub manager: TokenManager,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryTokenStore>,
    pub redirects: mpsc::UnboundedReceiver<Url>,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_settings(backend, test_settings())
    }

    pub fn with_settings(backend: FakeBackend, settings: Settings) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(MemoryTokenStore::new());
        let (navigator, redirects) = ChannelNavigator::new();
        let manager = TokenManager::new(
            backend.clone(),
            store.clone(),
            Arc::new(navigator),
            settings,
        );
        Self {
            manager,
            backend,
            store,
            redirects,
        }
    }

    /// Seeds the store as if an exchange had happened `expires_in` from now.
    pub fn seed_tokens(&self, access: Option<&str>, refresh: Option<&str>, expires_in: Duration) {
        if let Some(access) = access {
            self.store.set(StoreKey::AccessToken, access).unwrap();
        }
        if let Some(refresh) = refresh {
            self.store.set(StoreKey::RefreshToken, refresh).unwrap();
        }
        self.store
            .set(
                StoreKey::ExpiresAt,
                &encode_instant(SystemTime::now() + expires_in),
            )
            .unwrap();
    }

    pub fn redirect_count(&mut self) -> usize {
        let mut count = 0;
        while self.redirects.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

pub fn test_settings() -> Settings {
    Settings {
        auth_reentry_delay: Duration::from_millis(100),
        progress_poll_interval: Duration::from_millis(10),
        ..Settings::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CurrentPlayback,
    Devices,
    Transfer { device_id: String, play: bool },
    Pause { device: Option<String> },
    Resume { device: Option<String>, target: ResumeTarget },
    PlayContext { device_id: String, context_uri: String },
    Playlists,
    CurrentUser { token: String },
}

/// Records every Web API call; answers from canned values.
pub struct FakeRemote {
    pub calls: Mutex<Vec<RemoteCall>>,
    pub playback: Mutex<Result<Option<CurrentPlayback>, String>>,
    pub devices: Mutex<Vec<Device>>,
    pub playlists: Mutex<Vec<Playlist>>,
    pub rejected_tokens: Mutex<Vec<String>>,
    pub profile_outage: Mutex<bool>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            playback: Mutex::new(Ok(None)),
            devices: Mutex::new(Vec::new()),
            playlists: Mutex::new(Vec::new()),
            rejected_tokens: Mutex::new(Vec::new()),
            profile_outage: Mutex::new(false),
        }
    }

    pub fn with_playback(self, playback: Result<Option<CurrentPlayback>, String>) -> Self {
        *self.playback.lock().unwrap() = playback;
        self
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        *self.devices.lock().unwrap() = devices;
        self
    }

    pub fn rejecting(self, token: &str) -> Self {
        self.rejected_tokens.lock().unwrap().push(token.to_string());
        self
    }

    /// The profile endpoint answers 503 for every token.
    pub fn with_profile_outage(self) -> Self {
        *self.profile_outage.lock().unwrap() = true;
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn ok<T: Send + 'static>(value: T) -> BoxFuture<'static, Result<T, SessionError>> {
    async move { Ok(value) }.boxed()
}

impl RemotePlayback for FakeRemote {
    fn current_playback(
        &self,
        _token: &str,
    ) -> BoxFuture<'static, Result<Option<CurrentPlayback>, SessionError>> {
        self.record(RemoteCall::CurrentPlayback);
        let outcome = self.playback.lock().unwrap().clone();
        async move { outcome.map_err(SessionError::UpstreamUnavailable) }.boxed()
    }

    fn devices(&self, _token: &str) -> BoxFuture<'static, Result<Vec<Device>, SessionError>> {
        self.record(RemoteCall::Devices);
        ok(self.devices.lock().unwrap().clone())
    }

    fn transfer_playback(
        &self,
        _token: &str,
        device_id: &str,
        play: bool,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        self.record(RemoteCall::Transfer {
            device_id: device_id.to_string(),
            play,
        });
        ok(())
    }

    fn pause(
        &self,
        _token: &str,
        device_id: Option<&str>,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        self.record(RemoteCall::Pause {
            device: device_id.map(str::to_string),
        });
        ok(())
    }

    fn resume(
        &self,
        _token: &str,
        device_id: Option<&str>,
        target: ResumeTarget,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        self.record(RemoteCall::Resume {
            device: device_id.map(str::to_string),
            target,
        });
        ok(())
    }

    fn play_context(
        &self,
        _token: &str,
        device_id: &str,
        context_uri: &str,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        self.record(RemoteCall::PlayContext {
            device_id: device_id.to_string(),
            context_uri: context_uri.to_string(),
        });
        ok(())
    }

    fn user_playlists(
        &self,
        _token: &str,
    ) -> BoxFuture<'static, Result<Vec<Playlist>, SessionError>> {
        self.record(RemoteCall::Playlists);
        ok(self.playlists.lock().unwrap().clone())
    }

    fn current_user(&self, token: &str) -> BoxFuture<'static, Result<UserProfile, SessionError>> {
        self.record(RemoteCall::CurrentUser {
            token: token.to_string(),
        });
        if self.rejected_tokens.lock().unwrap().iter().any(|t| t == token) {
            let message = format!("current user: 401 Unauthorized: token {token} rejected");
            return async move { Err(SessionError::Unauthorized(message)) }.boxed();
        }
        if *self.profile_outage.lock().unwrap() {
            let message = "current user: 503 Service Unavailable: ".to_string();
            return async move { Err(SessionError::UpstreamUnavailable(message)) }.boxed();
        }
        ok(UserProfile {
            id: "user-1".to_string(),
            display_name: Some("Test User".to_string()),
        })
    }
}
