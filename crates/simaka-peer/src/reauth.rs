//! Fast Re-authentication Identity Store
//!
//! A successful full authentication may hand the peer a next
//! re-authentication identity (AT_NEXT_REAUTH_ID); the identity is stored
//! together with the master key, K_encr, K_aut and the replay counter, and
//! consumed by the next session that re-authenticates with it.
//!
//! Consumption is strictly single-use: [`ReauthStore::get_and_invalidate`]
//! atomically removes the entry, so of two concurrent sessions presenting
//! the same identity exactly one obtains it and the other observes it
//! already gone.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use simaka_proto::keys::{K_AUT_LEN, K_ENCR_LEN, MK_LEN};

/// Stored credentials for one fast re-authentication identity
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ReauthInfo {
    counter: u16,
    mk: [u8; MK_LEN],
    k_encr: [u8; K_ENCR_LEN],
    k_aut: [u8; K_AUT_LEN],
    #[zeroize(skip)]
    expires_at: Instant,
}

impl ReauthInfo {
    /// Create an entry valid for `lifetime` from now
    pub fn new(
        counter: u16,
        mk: [u8; MK_LEN],
        k_encr: [u8; K_ENCR_LEN],
        k_aut: [u8; K_AUT_LEN],
        lifetime: Duration,
    ) -> Self {
        ReauthInfo {
            counter,
            mk,
            k_encr,
            k_aut,
            expires_at: Instant::now() + lifetime,
        }
    }

    /// The last counter value accepted with these credentials
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Master key from the original full authentication
    pub fn mk(&self) -> &[u8; MK_LEN] {
        &self.mk
    }

    /// Stored encryption key
    pub fn k_encr(&self) -> &[u8; K_ENCR_LEN] {
        &self.k_encr
    }

    /// Stored authentication key
    pub fn k_aut(&self) -> &[u8; K_AUT_LEN] {
        &self.k_aut
    }

    /// Whether the entry is still within its validity window
    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl std::fmt::Debug for ReauthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthInfo")
            .field("counter", &self.counter)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Re-authentication identity storage shared across sessions.
///
/// Implementations must make `get_and_invalidate` atomic with respect to
/// concurrent callers and must not return expired entries.
pub trait ReauthStore: Send + Sync {
    /// Atomically fetch and remove the entry for `(reauth_id, permanent_id)`.
    fn get_and_invalidate(&self, reauth_id: &[u8], permanent_id: &[u8]) -> Option<ReauthInfo>;

    /// Store credentials for a next re-authentication identity, replacing
    /// any previous entry for the pair.
    fn register(
        &self,
        reauth_id: &[u8],
        permanent_id: &[u8],
        counter: u16,
        mk: &[u8; MK_LEN],
        k_encr: &[u8; K_ENCR_LEN],
        k_aut: &[u8; K_AUT_LEN],
    );
}

/// In-process [`ReauthStore`] over a concurrent map.
pub struct ReauthIdentityTracker {
    entries: DashMap<(Vec<u8>, Vec<u8>), ReauthInfo>,
    lifetime: Duration,
}

impl ReauthIdentityTracker {
    /// Default entry lifetime: 12 hours
    pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

    /// Create a tracker with the default entry lifetime
    pub fn new() -> Self {
        Self::with_lifetime(Self::DEFAULT_LIFETIME)
    }

    /// Create a tracker whose entries expire after `lifetime`
    pub fn with_lifetime(lifetime: Duration) -> Self {
        ReauthIdentityTracker {
            entries: DashMap::new(),
            lifetime,
        }
    }

    /// Number of stored entries (expired entries included until consumed)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tracker holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReauthIdentityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReauthStore for ReauthIdentityTracker {
    fn get_and_invalidate(&self, reauth_id: &[u8], permanent_id: &[u8]) -> Option<ReauthInfo> {
        // DashMap::remove is the atomicity boundary: a concurrent duplicate
        // request observes the entry already gone.
        let (_, info) = self
            .entries
            .remove(&(reauth_id.to_vec(), permanent_id.to_vec()))?;
        if !info.is_valid() {
            debug!("discarding expired reauth entry");
            return None;
        }
        Some(info)
    }

    fn register(
        &self,
        reauth_id: &[u8],
        permanent_id: &[u8],
        counter: u16,
        mk: &[u8; MK_LEN],
        k_encr: &[u8; K_ENCR_LEN],
        k_aut: &[u8; K_AUT_LEN],
    ) {
        debug!(counter, "registering reauth credentials");
        self.entries.insert(
            (reauth_id.to_vec(), permanent_id.to_vec()),
            ReauthInfo::new(counter, *mk, *k_encr, *k_aut, self.lifetime),
        );
    }
}
