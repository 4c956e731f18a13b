//! Per-peer reconciliation state.

use crate::hasher::ShortIdHasher;
use std::{collections::HashSet, time::Duration};

/// A 256-bit witness transaction identifier.
pub type Wtxid = [u8; 32];

/// Opaque handle identifying a peer to the tracker. The relay loop owns the mapping from this
/// id to an actual network session; the tracker never interprets it beyond equality/hashing.
pub type PeerId = i64;

/// Where a peer sits in the reconciliation handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// A salt has been generated and offered (or recorded), but the peer has not confirmed.
    PreRegistered {
        /// Salt generated locally for this peer at pre-registration time.
        local_salt: u64,
    },
    /// The handshake completed; the peer has a live announcement set and queue membership.
    Registered,
}

/// All state the tracker keeps for a single known peer.
///
/// Absence from the tracker's peer map *is* the `Forgotten` phase: there is deliberately no
/// tombstone so a forgotten peer can be pre-registered again with a clean slate.
#[derive(Debug)]
pub(crate) struct PeerState {
    pub(crate) phase: Phase,
    pub(crate) is_inbound: bool,
    /// We request sketches from this peer. Set iff the peer is outbound.
    pub(crate) we_initiate: bool,
    /// This peer will honor our sketch requests.
    pub(crate) they_respond: bool,
    /// `min(local, remote)`, valid once `phase` is `Registered`.
    pub(crate) version: u32,
    /// Keyed short-id hasher derived from the combined local/remote salts. Only present once
    /// registered; used to rank this peer deterministically in fanout decisions.
    pub(crate) short_id_hasher: Option<ShortIdHasher>,
    /// Transactions queued for the next reconciliation round with this peer.
    pub(crate) announcement_set: HashSet<Wtxid>,
    /// Whether this peer was chosen, at registration time, to also receive fanout for a small
    /// fraction of transactions on top of reconciliation.
    pub(crate) chosen_for_fanout: bool,
    /// Wall-clock time we last handed this peer a reconciliation request.
    pub(crate) last_request_time: Option<Duration>,
    /// `true` between `initiate_reconciliation_request` and the response/timeout.
    pub(crate) pending_request: bool,
}

impl PeerState {
    /// Creates a fresh `PreRegistered` entry. `is_inbound`/`we_initiate`/`they_respond` are
    /// finalized at [`enable_reconciliation_support`](crate::ReconciliationTracker::enable_reconciliation_support)
    /// time, since `pre_register_peer` alone does not know the peer's direction.
    pub(crate) fn pre_registered(local_salt: u64) -> Self {
        Self {
            phase: Phase::PreRegistered { local_salt },
            is_inbound: false,
            we_initiate: false,
            they_respond: false,
            version: 0,
            short_id_hasher: None,
            announcement_set: HashSet::new(),
            chosen_for_fanout: false,
            last_request_time: None,
            pending_request: false,
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        matches!(self.phase, Phase::Registered)
    }
}
