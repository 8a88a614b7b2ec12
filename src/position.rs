use serde::Serialize;

/// Opaque position-source collaborator. Geographic positioning acquisition
/// is out of scope; this trait is the seam a real GPS integration plugs
/// into without the Recording Coordinator or status endpoint knowing the
/// difference.
pub trait PositionSource: Send + Sync {
    fn start_tracking(&self) {}
    fn stop_tracking(&self) -> Option<TrackSnapshot> {
        None
    }
    fn current_fix(&self) -> Option<Position> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    pub points: Vec<Position>,
}

/// Default when no position source is configured; `/api/system/status`
/// omits the `gps` field entirely in this case.
pub struct NullPositionSource;

impl PositionSource for NullPositionSource {}

/// Reads a fixed-cadence position from a file for tests/demos — a stand-in
/// for a real USB-GPS receiver, which the original program integrates but
/// which this implementation treats as external per the component design.
pub struct ReplayPositionSource {
    fix: parking_lot::Mutex<Option<Position>>,
}

impl ReplayPositionSource {
    pub fn new(fix: Position) -> Self {
        ReplayPositionSource {
            fix: parking_lot::Mutex::new(Some(fix)),
        }
    }
}

impl PositionSource for ReplayPositionSource {
    fn current_fix(&self) -> Option<Position> {
        self.fix.lock().clone()
    }

    fn stop_tracking(&self) -> Option<TrackSnapshot> {
        self.fix.lock().clone().map(|p| TrackSnapshot { points: vec![p] })
    }
}
