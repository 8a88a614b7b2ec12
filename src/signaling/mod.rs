pub mod peer;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::camera_manager::CameraManager;
use crate::error::AppError;
use crate::relay::FrameSubscription;

pub use peer::{Peer, PeerState};

#[derive(Debug, serde::Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub vr: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Tracks the active peer set and processes offers. Each peer is registered
/// for transport state transitions; the callback tears down on
/// `failed`/`closed`, which is the only place a peer leaves the active set.
pub struct SignalingManager {
    camera_manager: Arc<CameraManager>,
    ice_servers: Vec<String>,
    peers: Mutex<HashMap<u64, Arc<Peer>>>,
    peers_by_owner: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
}

impl SignalingManager {
    pub fn new(camera_manager: Arc<CameraManager>, ice_servers: Vec<String>) -> Arc<Self> {
        Arc::new(SignalingManager {
            camera_manager,
            ice_servers,
            peers: Mutex::new(HashMap::new()),
            peers_by_owner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn active_peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub async fn handle_offer(self: &Arc<Self>, owner: String, request: OfferRequest) -> Result<AnswerResponse, AppError> {
        if request.kind != "offer" {
            return Err(AppError::Validation("type must be \"offer\"".into()));
        }
        let offer = RTCSessionDescription::offer(request.sdp)
            .map_err(|e| AppError::Validation(format!("invalid SDP offer: {e}")))?;

        let peer_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let connection = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?,
        );

        // Stereo reference, acquired before negotiation so a failure here
        // unwinds cleanly through `StereoGuard::drop` without ever reaching
        // a half-negotiated peer.
        let stereo_guard = if request.vr {
            Some(self.camera_manager.acquire_stereo().map_err(|e| {
                error!(error = %e, "failed to acquire stereo capture reference");
                AppError::Resource("capture_not_ready")
            })?)
        } else {
            None
        };

        let (primary_sub, secondary_sub) = self.camera_manager.subscribe(request.vr);

        // setRemote -> attachTracks -> createAnswer+setLocal, in that order: no
        // track-feed task is spawned until every fallible negotiation step has
        // succeeded, so an invalid offer or a failed answer leaves nothing
        // running behind it.
        let (answer, feeders) = match self.negotiate(&connection, offer, primary_sub, secondary_sub).await {
            Ok(v) => v,
            Err(err) => {
                let _ = connection.close().await;
                return Err(err);
            }
        };

        for (track, subscription, label) in feeders {
            spawn_track_feed(track, subscription, label);
        }

        let peer = Arc::new(Peer::new(peer_id, connection.clone(), stereo_guard));
        self.peers.lock().insert(peer_id, peer.clone());
        self.peers_by_owner.lock().insert(owner.clone(), peer_id);

        let manager = self.clone();
        let state_peer = peer.clone();
        let state_owner = owner.clone();
        connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let manager = manager.clone();
            let peer = state_peer.clone();
            let owner = state_owner.clone();
            Box::pin(async move {
                info!(peer_id = peer.id, ?state, "peer connection state changed");
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed | RTCPeerConnectionState::Disconnected
                ) {
                    manager.peers.lock().remove(&peer.id);
                    manager.peers_by_owner.lock().remove(&owner);
                    peer.close().await;
                }
            })
        }));

        Ok(AnswerResponse {
            sdp: answer.sdp,
            kind: "answer".to_string(),
        })
    }

    /// Runs the full negotiation before anything is spawned: setRemote,
    /// then attach tracks, then createAnswer+setLocal. Each subscription is
    /// only ever handed to a feed task once this returns `Ok`, so the
    /// caller's cleanup-on-error path never has to chase a detached task.
    async fn negotiate(
        &self,
        connection: &Arc<webrtc::peer_connection::RTCPeerConnection>,
        offer: RTCSessionDescription,
        primary: FrameSubscription,
        secondary: Option<FrameSubscription>,
    ) -> Result<(RTCSessionDescription, Vec<TrackFeed>), AppError> {
        connection
            .set_remote_description(offer)
            .await
            .map_err(|e| AppError::Validation(format!("failed to set remote description: {e}")))?;

        let mut feeders = Vec::with_capacity(2);
        let primary_track = add_track(connection, "primary")
            .await
            .map_err(AppError::Internal)?;
        feeders.push((primary_track, primary, "primary"));
        if let Some(secondary) = secondary {
            let secondary_track = add_track(connection, "secondary")
                .await
                .map_err(AppError::Internal)?;
            feeders.push((secondary_track, secondary, "secondary"));
        }

        let answer = connection
            .create_answer(None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        Ok((answer, feeders))
    }

    pub async fn close_peer(&self, peer_id: u64) {
        let peer = self.peers.lock().remove(&peer_id);
        if let Some(peer) = peer {
            peer.close().await;
        }
    }

    /// Closes the caller's own peer, looked up by the owning username —
    /// the route carries no explicit peer id (`POST /webrtc/close` takes
    /// no body).
    pub async fn close_peer_for_owner(&self, owner: &str) {
        let peer_id = self.peers_by_owner.lock().remove(owner);
        if let Some(peer_id) = peer_id {
            self.close_peer(peer_id).await;
        }
    }

    pub async fn close_all(&self) {
        let peers: Vec<_> = self.peers.lock().drain().map(|(_, p)| p).collect();
        self.peers_by_owner.lock().clear();
        for peer in peers {
            peer.close().await;
        }
    }
}

type TrackFeed = (Arc<TrackLocalStaticSample>, FrameSubscription, &'static str);

async fn add_track(
    connection: &Arc<webrtc::peer_connection::RTCPeerConnection>,
    label: &'static str,
) -> Result<Arc<TrackLocalStaticSample>> {
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: webrtc::api::media_engine::MIME_TYPE_VP8.to_string(),
            ..Default::default()
        },
        label.to_string(),
        "camguard".to_string(),
    ));

    connection
        .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .context("failed to add track to peer connection")?;

    Ok(track)
}

fn spawn_track_feed(track: Arc<TrackLocalStaticSample>, mut subscription: FrameSubscription, label: &'static str) {
    tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(frame) => {
                    let sample = Sample {
                        data: frame.bytes.as_ref().clone().into(),
                        duration: Duration::from_millis(33),
                        ..Default::default()
                    };
                    if let Err(err) = track.write_sample(&sample).await {
                        warn!(label, error = %err, "failed writing sample, stopping track feed");
                        break;
                    }
                }
                Err(_) => {
                    info!(label, "frame relay closed, stopping track feed");
                    break;
                }
            }
        }
    });
}
