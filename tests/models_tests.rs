use std::time::{Duration, SystemTime};

use serde_json::json;
use shadowfy_rs::{
    is_usable, progress_permille, CurrentPlayback, DevicesResponse, EnvConfig, LocalPlayerState,
    PlaybackSnapshot, SessionTokens, TokenResponse,
};

// Test the runtime configuration wire names
#[test]
fn test_env_config_model() {
    let env: EnvConfig = serde_json::from_value(json!({
        "CLIENT_ID": "client123",
        "REDIRECT_URI": "http://localhost:8000/player"
    }))
    .unwrap();
    assert_eq!(env.client_id, "client123");
    assert_eq!(env.redirect_uri, "http://localhost:8000/player");
}

// Refresh responses may omit the refresh token
#[test]
fn test_token_response_model() {
    let response: TokenResponse = serde_json::from_value(json!({
        "access_token": "access",
        "expires_in": 3600
    }))
    .unwrap();
    assert_eq!(response.access_token.as_deref(), Some("access"));
    assert_eq!(response.refresh_token, None);
    assert_eq!(response.expires_in, 3600);

    let empty: TokenResponse = serde_json::from_value(json!({})).unwrap();
    assert_eq!(empty, TokenResponse::default());
}

#[test]
fn test_expiry_margin() {
    let margin = Duration::from_secs(300);
    let now = SystemTime::now();

    assert!(is_usable(now + Duration::from_secs(3600), margin));
    assert!(!is_usable(now + Duration::from_secs(240), margin));
    assert!(!is_usable(now, margin));
    assert!(!is_usable(SystemTime::UNIX_EPOCH, margin));

    let tokens = SessionTokens::issued_now("a".to_string(), None, 3600);
    assert!(tokens.is_usable(margin));
    assert!(!SessionTokens::issued_now("a".to_string(), None, 200).is_usable(margin));
}

// Test CurrentPlayback model deserialization
#[test]
fn test_current_playback_model() {
    let playback: CurrentPlayback = serde_json::from_value(json!({
        "device": {
            "id": "phone-1",
            "is_active": true,
            "name": "Pixel",
            "type": "Smartphone",
            "volume_percent": 70
        },
        "progress_ms": 30000,
        "is_playing": true,
        "context": { "uri": "spotify:album:abc", "type": "album" },
        "item": {
            "name": "Song",
            "uri": "spotify:track:1",
            "duration_ms": 120000,
            "album": { "name": "", "images": [{ "url": "https://i.scdn.co/a.jpg", "height": 640 }] },
            "artists": [{ "name": "A" }, { "name": "B" }]
        }
    }))
    .unwrap();

    assert_eq!(playback.device_id(), Some("phone-1"));
    assert_eq!(playback.device_name(), Some("Pixel"));

    let snapshot = PlaybackSnapshot::from_remote(&playback).unwrap();
    assert_eq!(snapshot.track, "Song");
    assert_eq!(snapshot.artists, "A, B");
    assert_eq!(snapshot.album, "Unknown Album");
    assert_eq!(snapshot.image_url.as_deref(), Some("https://i.scdn.co/a.jpg"));
    assert_eq!(snapshot.progress_permille(), 250.0);
    assert!(snapshot.is_playing);
}

// Playback with no item renders as nothing playing
#[test]
fn test_current_playback_without_item() {
    let playback: CurrentPlayback =
        serde_json::from_value(json!({ "is_playing": false, "device": null })).unwrap();
    assert!(PlaybackSnapshot::from_remote(&playback).is_none());
    assert_eq!(playback.device_id(), None);
}

// Test devices list, including restricted devices without ids
#[test]
fn test_devices_model() {
    let response: DevicesResponse = serde_json::from_value(json!({
        "devices": [
            { "id": "a", "is_active": false, "name": "Shadowfy", "type": "Computer" },
            { "id": null, "is_active": true, "name": "Speaker", "type": "Speaker" }
        ]
    }))
    .unwrap();
    assert_eq!(response.devices.len(), 2);
    assert_eq!(response.devices[0].device_type, "Computer");
    assert_eq!(response.devices[1].id, None);
}

// Test the SDK state shape
#[test]
fn test_local_player_state_model() {
    let state: LocalPlayerState = serde_json::from_value(json!({
        "paused": true,
        "position": 45000,
        "duration": 180000,
        "track_window": {
            "current_track": {
                "name": "Local",
                "uri": "spotify:track:2",
                "album": { "name": "Record", "images": [] },
                "artists": [{ "name": "C" }]
            }
        }
    }))
    .unwrap();

    assert!(state.has_active_track());
    let snapshot = PlaybackSnapshot::from_local(&state, "device-1").unwrap();
    assert_eq!(snapshot.album, "Record");
    assert_eq!(snapshot.duration_ms, 180000);
    assert_eq!(snapshot.progress_permille(), 250.0);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.active_device_id.as_deref(), Some("device-1"));

    let idle: LocalPlayerState = serde_json::from_value(json!({ "paused": true })).unwrap();
    assert!(!idle.has_active_track());
}

#[test]
fn test_progress_permille_bounds() {
    assert_eq!(progress_permille(0, 0), 0.0);
    assert_eq!(progress_permille(500, 1000), 500.0);
    assert_eq!(progress_permille(2000, 1000), 1000.0);
}
