use std::sync::Arc;

use crate::auth::{CredentialStore, TokenAuthority};
use crate::camera_manager::CameraManager;
use crate::config::Config;
use crate::recording::RecordingCoordinator;
use crate::signaling::SignalingManager;

/// Shared application state, cloned (cheaply, via `Arc`) into every request
/// handler. Assembled once in `main` and threaded through the router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credential_store: Arc<CredentialStore>,
    pub token_authority: Arc<TokenAuthority>,
    pub camera_manager: Arc<CameraManager>,
    pub signaling: Arc<SignalingManager>,
    pub recording: Arc<RecordingCoordinator>,
}
