//! The deterministic keyed hash used to rank peers for fanout selection, and the salt source
//! used to seed it.

use crate::peer::{PeerId, Wtxid};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

/// Produces cryptographically-random 64-bit salts for peer pre-registration.
///
/// Abstracted behind a trait so tests can inject determinism; production callers use
/// [`OsRngSaltSource`].
pub trait SaltSource: Send + Sync {
    /// Returns a fresh 64-bit salt.
    fn next_salt(&self) -> u64;
}

/// Default [`SaltSource`] backed by the OS random number generator via `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngSaltSource;

impl SaltSource for OsRngSaltSource {
    fn next_salt(&self) -> u64 {
        rand::random()
    }
}

/// An opaque keyed-hash object derived from two peers' combined salts.
///
/// Both ends of a reconciliation session derive the same two keys from their respective local
/// and remote salts (initiator's salt first, responder's salt second), so [`Self::rank`] produces
/// identical rankings on independent hosts for the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShortIdHasher {
    k0: u64,
    k1: u64,
}

impl ShortIdHasher {
    /// Builds the hasher from the initiator's and responder's salts, in that order.
    pub(crate) fn from_salts(initiator_salt: u64, responder_salt: u64) -> Self {
        Self { k0: initiator_salt, k1: responder_salt }
    }

    /// Computes a pseudo-random, transaction- and peer-specific rank.
    ///
    /// Lower is "more selected": callers pick the `K` peers with the lowest rank for a given
    /// `wtxid`.
    pub(crate) fn rank(&self, wtxid: &Wtxid, peer_id: PeerId) -> u64 {
        let mut hasher = SipHasher24::new_with_keys(self.k0, self.k1);
        hasher.write(wtxid);
        hasher.write_i64(peer_id);
        hasher.finish()
    }
}
