use std::error::Error;
use std::sync::Arc;

use shadowfy_rs::{
    authenticate, FileTokenStore, LoggingNavigator, RemotePlayback, Startup, TokenManager,
    WebApiClient, SETTINGS,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const TOKEN_FILENAME: &str = "shadowfy_tokens.json";

/// Authorizes against the configured backend and lists the account's devices.
///
/// Run once without arguments to get the authorization URL, then again with
/// the `code` query parameter from the redirect.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut code = None;
    let mut debug_mode = false;

    for arg in args.iter().skip(1) {
        if arg == "--debug" || arg == "-d" {
            debug_mode = true;
        } else if code.is_none() {
            code = Some(arg.clone());
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if debug_mode { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = SETTINGS.clone();
    let store = Arc::new(FileTokenStore::open(TOKEN_FILENAME)?);
    let web_api = WebApiClient::from_settings(&settings)?;
    let manager = TokenManager::from_settings(settings, store, Arc::new(LoggingNavigator))?;

    match authenticate(&manager, &web_api, code.as_deref()).await? {
        Startup::Ready(token) => {
            println!("Authorized, tokens saved to {}", TOKEN_FILENAME);
            for device in web_api.devices(&token).await? {
                println!(
                    "  {} ({}{})",
                    device.name,
                    device.device_type,
                    if device.is_active { " - active" } else { "" }
                );
            }
        }
        Startup::RedirectHome => {
            println!("Usage: authorize [code] [--debug/-d]");
            println!("  - code: the `code` query parameter from the authorization redirect");
        }
    }

    Ok(())
}
