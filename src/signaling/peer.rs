use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::peer_connection::RTCPeerConnection;

use crate::camera_manager::StereoGuard;

/// Peer-connection lifecycle, mirrored from the state machine named in the
/// component design: created -> remoteSet -> tracksAttached -> answered ->
/// {connected, failed, closed}. The enum only tracks the high-level phase
/// clients care about; the detailed sub-states live as local variables in
/// `SignalingManager::handle_offer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// One negotiated session. Owns the transport and, for stereo sessions, a
/// `StereoGuard` whose `Drop` releases the Camera Manager's reference count
/// exactly once — whether teardown is triggered by the client, a signaling
/// error, or server shutdown.
pub struct Peer {
    pub id: u64,
    pub connection: Arc<RTCPeerConnection>,
    stereo_guard: Option<StereoGuard>,
    closed: AtomicBool,
}

impl Peer {
    pub fn new(id: u64, connection: Arc<RTCPeerConnection>, stereo_guard: Option<StereoGuard>) -> Self {
        Peer {
            id,
            connection,
            stereo_guard,
            closed: AtomicBool::new(false),
        }
    }

    /// Idempotent: safe to call from the client-initiated close route, the
    /// transport's own failed/closed callback, and server shutdown without
    /// risk of double-releasing the stereo reference.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(peer_id = self.id, "closing peer connection");
        let _ = self.connection.close().await;
        if let Some(guard) = &self.stereo_guard {
            guard.release();
        }
        info!(peer_id = self.id, "peer connection closed");
    }
}
