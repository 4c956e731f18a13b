//! Error types returned by the registry's handshake operations.

use crate::peer::PeerId;

/// Failure modes of [`ReconciliationTracker::enable_reconciliation_support`].
///
/// [`ReconciliationTracker::enable_reconciliation_support`]: crate::ReconciliationTracker::enable_reconciliation_support
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The peer was already in phase `Registered`.
    #[error("peer {0} is already registered for reconciliation")]
    AlreadyRegistered(PeerId),
    /// No prior call to `suggest_reconciling`/`pre_register_peer` exists for this peer.
    #[error("peer {0} was never pre-registered")]
    NotFound(PeerId),
    /// The remote violated the handshake contract: version 0, or a role that does not match
    /// its inbound/outbound direction.
    #[error("peer {0} violated the reconciliation handshake protocol: {1}")]
    ProtocolViolation(PeerId, ProtocolViolationReason),
}

/// Specific reason a handshake was rejected as a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolationReason {
    /// The remote announced protocol version 0.
    ZeroVersion,
    /// An outbound peer did not offer to respond to our sketch requests.
    OutboundPeerNotResponder,
    /// An inbound peer did not offer to request sketches from us.
    InboundPeerNotRequestor,
}

impl std::fmt::Display for ProtocolViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::ZeroVersion => "remote announced protocol version 0",
            Self::OutboundPeerNotResponder => "outbound peer did not offer recon_responder",
            Self::InboundPeerNotRequestor => "inbound peer did not offer recon_requestor",
        };
        f.write_str(msg)
    }
}
