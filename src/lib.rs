pub mod auth;
pub mod camera_manager;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod http;
pub mod logging;
pub mod mjpeg;
pub mod motion;
pub mod position;
pub mod recording;
pub mod relay;
pub mod signaling;
pub mod sinks;
pub mod state;

use std::sync::Arc;
use tracing::info;

use camera_manager::CameraManager;
use config::Config;
use position::{NullPositionSource, PositionSource};
use recording::RecordingCoordinator;
use signaling::SignalingManager;
use sinks::{HttpUploadSink, NotifySink, UploadSink, WebhookNotifySink};
use state::AppState;

/// Assembles every process-scoped collaborator in the order documented in
/// the design notes (store, token authority, camera manager, recording
/// coordinator, signaling manager) and returns the finished router plus the
/// signaling manager, so the caller can drive graceful shutdown.
pub async fn build_app(config: Config) -> anyhow::Result<(axum::Router, Arc<SignalingManager>)> {
    let credential_store = Arc::new(auth::CredentialStore::open(&config)?);
    let token_authority = Arc::new(auth::TokenAuthority::new(&config)?);
    let camera_manager = Arc::new(CameraManager::new(&config)?);

    let upload_sink: Option<Arc<dyn UploadSink>> = config
        .sinks
        .upload_endpoint
        .clone()
        .map(|endpoint| Arc::new(HttpUploadSink::new(endpoint)) as Arc<dyn UploadSink>);
    let notify_sink: Option<Arc<dyn NotifySink>> = config
        .sinks
        .notify_webhook
        .clone()
        .map(|webhook| Arc::new(WebhookNotifySink::new(webhook)) as Arc<dyn NotifySink>);
    let notify_recipient = config.sinks.notify_webhook.as_ref().map(|_| "operator".to_string());
    let position_source: Arc<dyn PositionSource> = Arc::new(NullPositionSource);

    let recording = Arc::new(RecordingCoordinator::new(
        &config,
        upload_sink,
        notify_sink,
        notify_recipient,
        position_source,
    ));

    let signaling = SignalingManager::new(camera_manager.clone(), config.webrtc.ice_servers.clone());

    let app_state = AppState {
        config: Arc::new(config),
        credential_store,
        token_authority,
        camera_manager,
        signaling: signaling.clone(),
        recording,
    };

    Ok((http::router(app_state), signaling))
}

/// Waits for Ctrl-C (or SIGTERM on unix), then closes every live peer
/// before the server finishes shutting down — new connections stop the
/// instant this future resolves, so peer teardown always precedes capture
/// producer `Drop` on process exit.
pub async fn shutdown_signal(signaling: Arc<SignalingManager>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, closing active peers");
    signaling.close_all().await;
}
