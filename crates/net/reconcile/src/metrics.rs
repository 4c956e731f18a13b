//! Injectable counters for the tracker's lifecycle and scheduling events.
//!
//! The core works with metrics entirely absent: [`NoopMetrics`] is the default and every method
//! has an empty default body, so an embedder only overrides what it cares about.

/// Callbacks the tracker invokes at the same points it emits a `tracing` event.
pub trait TrackerMetrics: Send + Sync {
    /// A peer completed the handshake and transitioned to `Registered`.
    fn peer_registered(&self) {}
    /// A peer was forgotten.
    fn peer_forgotten(&self) {}
    /// A transaction was chosen for fanout to a peer of the given direction.
    fn fanout_chosen(&self, _is_inbound: bool) {}
    /// The reconciliation queue rotated to its next head.
    fn queue_rotated(&self) {}
}

/// Default [`TrackerMetrics`] that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl TrackerMetrics for NoopMetrics {}

/// [`TrackerMetrics`] backed by the `metrics` facade crate, recording into whatever recorder the
/// embedder has installed globally.
#[cfg(feature = "metrics")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedMetrics;

#[cfg(feature = "metrics")]
impl TrackerMetrics for RecordedMetrics {
    fn peer_registered(&self) {
        metrics::counter!("reconcile_peers_registered_total").increment(1);
    }

    fn peer_forgotten(&self) {
        metrics::counter!("reconcile_peers_forgotten_total").increment(1);
    }

    fn fanout_chosen(&self, is_inbound: bool) {
        let direction = if is_inbound { "inbound" } else { "outbound" };
        metrics::counter!("reconcile_fanout_chosen_total", "direction" => direction).increment(1);
    }

    fn queue_rotated(&self) {
        metrics::counter!("reconcile_queue_rotations_total").increment(1);
    }
}
