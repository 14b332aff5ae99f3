use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::UNIX_EPOCH;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backend::{AuthBackend, HttpAuthBackend};
use crate::models::{is_usable, CodeExchangeRequest, EnvConfig, RefreshRequest, SessionTokens};
use crate::pkce::PkcePair;
use crate::store::{decode_instant, encode_instant, StoreKey, TokenStore};
use crate::{SessionError, Settings};

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Scopes needed to read the profile, stream through the SDK and control playback.
pub const SCOPES: &str = "user-read-private user-read-email streaming user-read-playback-state user-modify-playback-state";

/// Performs the full-page redirect to the authorization endpoint.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Navigator for headless targets: logs the URL for the user to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, url: &Url) {
        info!(%url, "Open this URL in a browser to authorize");
    }
}

/// Navigator that hands every redirect to a receiver, for hosts that drive
/// their own browser window.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<Url>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Url>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, url: &Url) {
        if self.tx.send(url.clone()).is_err() {
            warn!("Authorization redirect dropped, receiver is gone");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// Builds the provider authorization URL for one PKCE attempt.
pub fn authorization_url(env: &EnvConfig, challenge: &str) -> Result<Url, SessionError> {
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", env.client_id.as_str()),
        ("scope", SCOPES),
        ("redirect_uri", env.redirect_uri.as_str()),
        ("code_challenge_method", "S256"),
        ("code_challenge", challenge),
    ])?;
    let mut url = Url::parse(AUTHORIZE_URL)?;
    url.set_query(Some(&query));
    Ok(url)
}

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

struct ManagerInner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    settings: Settings,
    env: OnceCell<EnvConfig>,
    // Set while a redirect is underway; reset by a timer, never by the flow itself.
    auth_in_progress: Arc<AtomicBool>,
    refresh_in_flight: Mutex<Option<PendingRefresh>>,
    state_tx: watch::Sender<AuthState>,
}

/// Clears the in-flight marker when the refresh task ends, panics included.
struct InFlightGuard(Arc<ManagerInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slot = self
            .0
            .refresh_in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        *slot = None;
        trace!("Refresh in-flight marker cleared");
    }
}

/// Owns the session tokens: authorization redirect, code exchange and
/// single-flight refresh.
///
/// Cloning is cheap; clones share the same cache, in-flight marker and state.
/// Every other component reads tokens through [`TokenManager::get_valid_token`].
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<ManagerInner>,
}

impl TokenManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        settings: Settings,
    ) -> Self {
        let initial = if store.get(StoreKey::AccessToken).is_some()
            || store.get(StoreKey::RefreshToken).is_some()
        {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            inner: Arc::new(ManagerInner {
                backend,
                store,
                navigator,
                settings,
                env: OnceCell::new(),
                auth_in_progress: Arc::new(AtomicBool::new(false)),
                refresh_in_flight: Mutex::new(None),
                state_tx,
            }),
        }
    }

    /// Manager talking HTTP to the backend configured in `settings`.
    pub fn from_settings(
        settings: Settings,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        let backend = HttpAuthBackend::from_settings(&settings)?;
        Ok(Self::new(Arc::new(backend), store, navigator, settings))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn state(&self) -> AuthState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    /// Runtime configuration, fetched once and cached.
    pub async fn env(&self) -> Result<EnvConfig, SessionError> {
        self.inner.env().await
    }

    /// Starts the authorization redirect. Returns immediately when one is
    /// already underway.
    pub async fn begin_authorization(&self) -> Result<(), SessionError> {
        self.inner.begin_authorization().await
    }

    /// Redeems an authorization code for session tokens and returns the access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, SessionError> {
        self.inner.exchange_code(code).await
    }

    /// Returns a usable access token, refreshing it if needed.
    ///
    /// `Ok(None)` means "not authenticated yet": an authorization redirect has
    /// been started and the caller should stop its current operation.
    /// Concurrent callers share a single refresh round trip and all observe
    /// its outcome.
    pub async fn get_valid_token(&self) -> Result<Option<String>, SessionError> {
        let inner = &self.inner;

        if let Some(token) = inner.usable_access_token() {
            trace!("Using cached access token");
            return Ok(Some(token));
        }

        let Some(refresh_token) = inner.store.get(StoreKey::RefreshToken) else {
            info!("No usable access token and no refresh token, starting authorization");
            inner.begin_authorization().await?;
            return Ok(None);
        };

        let pending = {
            let mut slot = inner
                .refresh_in_flight
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining token refresh already in flight");
                    pending.clone()
                }
                None => {
                    // A refresh may have landed between the cache check and the lock.
                    if let Some(token) = inner.usable_access_token() {
                        return Ok(Some(token));
                    }
                    let pending = ManagerInner::spawn_refresh(inner, refresh_token);
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        Ok(pending.await)
    }

    /// Drops only the cached access token so the next
    /// [`get_valid_token`](Self::get_valid_token) goes through a refresh.
    pub fn invalidate_access_token(&self) -> Result<(), SessionError> {
        debug!("Invalidating cached access token");
        self.inner.store.remove(StoreKey::AccessToken)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.store.get(StoreKey::RefreshToken).is_some()
    }

    /// Snapshot of the cached tokens, if an access token is stored.
    pub fn cached_tokens(&self) -> Option<SessionTokens> {
        let store = &self.inner.store;
        Some(SessionTokens {
            access_token: store.get(StoreKey::AccessToken)?,
            refresh_token: store.get(StoreKey::RefreshToken),
            expires_at: store
                .get(StoreKey::ExpiresAt)
                .map(|text| decode_instant(&text))
                .unwrap_or(UNIX_EPOCH),
        })
    }

    /// Clears every stored value and returns to `Unauthenticated`.
    pub fn logout(&self) -> Result<(), SessionError> {
        info!("Logging out, clearing session tokens");
        self.inner.store.clear()?;
        self.inner.set_state(AuthState::Unauthenticated);
        Ok(())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("state", &self.state())
            .field("backend_url", &self.inner.settings.backend_url)
            .finish()
    }
}

impl ManagerInner {
    fn set_state(&self, state: AuthState) {
        self.state_tx.send_if_modified(|prev| {
            if *prev != state {
                debug!(from = ?*prev, to = ?state, "Auth state changed");
                *prev = state;
                true
            } else {
                false
            }
        });
    }

    fn usable_access_token(&self) -> Option<String> {
        let token = self.store.get(StoreKey::AccessToken)?;
        let expires_at = self
            .store
            .get(StoreKey::ExpiresAt)
            .map(|text| decode_instant(&text))
            .unwrap_or(UNIX_EPOCH);
        is_usable(expires_at, self.settings.refresh_margin).then_some(token)
    }

    async fn env(&self) -> Result<EnvConfig, SessionError> {
        self.env
            .get_or_try_init(|| self.backend.load_env())
            .await
            .cloned()
            .map_err(|e| match e {
                SessionError::ConfigurationUnavailable(_) => e,
                other => SessionError::ConfigurationUnavailable(other.to_string()),
            })
    }

    async fn begin_authorization(&self) -> Result<(), SessionError> {
        if self.auth_in_progress.swap(true, Ordering::SeqCst) {
            debug!("Authorization redirect already underway, ignoring");
            return Ok(());
        }

        let flag = Arc::clone(&self.auth_in_progress);
        let delay = self.settings.auth_reentry_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            flag.store(false, Ordering::SeqCst);
        });

        let env = self.env().await?;
        let pkce = PkcePair::generate(self.settings.verifier_length);
        self.store.set(StoreKey::Verifier, &pkce.verifier)?;
        let url = authorization_url(&env, &pkce.challenge)?;

        self.set_state(AuthState::Authenticating);
        info!("Redirecting to authorization endpoint");
        self.navigator.navigate(&url);
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, SessionError> {
        let env = self.env().await?;
        let verifier = self.store.get(StoreKey::Verifier).ok_or_else(|| {
            SessionError::ExchangeError("no PKCE verifier stored for this attempt".to_string())
        })?;

        let request = CodeExchangeRequest {
            code: code.to_string(),
            code_verifier: verifier,
            redirect_uri: env.redirect_uri,
        };
        let response = self.backend.exchange_code(request).await?;

        let expires_in = response.expires_in;
        let access_token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SessionError::ExchangeError("access token missing from response".to_string())
            })?;

        let tokens = SessionTokens::issued_now(access_token, response.refresh_token, expires_in);
        self.persist(&tokens)?;
        self.store.remove(StoreKey::Verifier)?;
        self.set_state(AuthState::Authenticated);
        info!(expires_in, "Session tokens stored");
        Ok(tokens.access_token)
    }

    fn persist(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        self.store.set(StoreKey::AccessToken, &tokens.access_token)?;
        self.store
            .set(StoreKey::ExpiresAt, &encode_instant(tokens.expires_at))?;
        if let Some(ref refresh_token) = tokens.refresh_token {
            self.store.set(StoreKey::RefreshToken, refresh_token)?;
        }
        Ok(())
    }

    /// Must be called with the in-flight slot locked; the caller stores the
    /// returned future in it.
    fn spawn_refresh(this: &Arc<Self>, refresh_token: String) -> PendingRefresh {
        this.set_state(AuthState::Refreshing);
        let inner = Arc::clone(this);

        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard(Arc::clone(&inner));
            match inner.refresh(refresh_token).await {
                Ok(token) => {
                    inner.set_state(AuthState::Authenticated);
                    Some(token)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, clearing session and re-authorizing");
                    if let Err(e) = inner.store.clear() {
                        error!(error = %e, "Failed to clear token store");
                    }
                    inner.set_state(AuthState::Unauthenticated);
                    if let Err(e) = inner.begin_authorization().await {
                        error!(error = %e, "Could not start authorization after failed refresh");
                    }
                    None
                }
            }
        });

        handle
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!(error = %e, "Token refresh task aborted");
                    None
                })
            })
            .boxed()
            .shared()
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, SessionError> {
        debug!("Refreshing access token");
        let response = self.backend.refresh(RefreshRequest { refresh_token }).await?;

        let expires_in = response.expires_in;
        let access_token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SessionError::RefreshError("access token missing from response".to_string())
            })?;

        let tokens = SessionTokens::issued_now(access_token, response.refresh_token, expires_in);
        self.persist(&tokens)?;
        info!(
            expires_in,
            rotated = tokens.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(tokens.access_token)
    }
}
