use tracing::{debug, info, warn};

use crate::auth::TokenManager;
use crate::web_api::RemotePlayback;
use crate::SessionError;

/// Where the host should go once startup authentication settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    /// Authenticated; carry on with this access token.
    Ready(String),
    /// No session could be established. Return to the landing page.
    RedirectHome,
}

/// Establishes the session when the player page loads.
///
/// `code` is the authorization code from the redirect query string, if the
/// provider just sent the user back. A failed exchange clears the store and
/// is returned as an error for the host to report. Without a code the cached
/// session is checked against the profile endpoint. Only a 401 counts as a
/// rejected token and earns a single refresh attempt; any other profile
/// failure is returned as is and the cached tokens are kept.
pub async fn authenticate(
    manager: &TokenManager,
    remote: &dyn RemotePlayback,
    code: Option<&str>,
) -> Result<Startup, SessionError> {
    if let Some(code) = code {
        return match manager.exchange_code(code).await {
            Ok(token) => Ok(Startup::Ready(token)),
            Err(e) => {
                warn!(error = %e, "Authorization code exchange failed");
                manager.logout()?;
                Err(e)
            }
        };
    }

    let Some(token) = manager.get_valid_token().await? else {
        return Ok(Startup::RedirectHome);
    };

    match remote.current_user(&token).await {
        Ok(profile) => {
            info!(user = %profile.id, "Session validated");
            Ok(Startup::Ready(token))
        }
        Err(SessionError::Unauthorized(reason)) if manager.has_refresh_token() => {
            debug!(%reason, "Cached access token rejected, refreshing once");
            manager.invalidate_access_token()?;
            // A failed refresh has already cleared the store and started a
            // new authorization whose verifier must survive.
            Ok(match manager.get_valid_token().await? {
                Some(token) => Startup::Ready(token),
                None => Startup::RedirectHome,
            })
        }
        Err(SessionError::Unauthorized(reason)) => {
            warn!(%reason, "Cached access token rejected and no refresh token");
            manager.logout()?;
            Ok(Startup::RedirectHome)
        }
        Err(e) => {
            warn!(error = %e, "Profile check failed, keeping cached session");
            Err(e)
        }
    }
}
