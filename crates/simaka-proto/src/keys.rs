//! Master Key and Session Key Derivation (RFC 4186#7, RFC 4187#7)
//!
//! Full authentication derives a 160-bit master key MK from the identity
//! and the vectors returned by the card:
//!
//! ```text
//! EAP-SIM: MK = SHA1(Identity | n*Kc | NONCE_MT | Version List | Selected Version)
//! EAP-AKA: MK = SHA1(Identity | IK | CK)
//! ```
//!
//! MK seeds the FIPS 186-2 PRF, whose first 160 output bytes become
//! K_encr (16) | K_aut (16) | MSK (64) | EMSK (64).
//!
//! Fast re-authentication keeps K_encr/K_aut and re-derives only the
//! session keys from XKEY' = SHA1(Identity | counter | NONCE_S | MK),
//! taking MSK (64) | EMSK (64) from the first 128 PRF bytes.
//!
//! All key containers zeroize on drop.

use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::attributes::NONCE_LEN;
use crate::crypto::prf::{fips186_2_prf, SEED_LEN};

/// Master key length: one SHA-1 digest
pub const MK_LEN: usize = 20;

/// Derived encryption key length (RFC 4186#7)
pub const K_ENCR_LEN: usize = 16;

/// Derived authentication key length (RFC 4186#7)
pub const K_AUT_LEN: usize = 16;

/// Master session key length; at least 64 bytes per RFC 3748#7.10
pub const MSK_LEN: usize = 64;

/// Extended master session key length
pub const EMSK_LEN: usize = 64;

/// GSM Kc cipher key length
pub const KC_LEN: usize = 8;

/// UMTS integrity key length (RFC 4187#1)
pub const IK_LEN: usize = 16;

/// UMTS cipher key length (RFC 4187#1)
pub const CK_LEN: usize = 16;

/// The 160-bit master key derived from a full authentication.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; MK_LEN]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// The key bundle expanded from MK.
///
/// K_encr protects AT_ENCR_DATA, K_aut keys AT_MAC, and MSK/EMSK are
/// released to the caller on the terminal success transition.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub k_encr: [u8; K_ENCR_LEN],
    pub k_aut: [u8; K_AUT_LEN],
    pub msk: [u8; MSK_LEN],
    pub emsk: [u8; EMSK_LEN],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Derive the EAP-SIM master key.
///
/// # Arguments
/// * `identity` - The identity used in the last AT_IDENTITY response, or
///   the EAP identity if none was sent
/// * `kcs` - The Kc values from each GSM challenge, in RAND order
/// * `nonce_mt` - The peer nonce sent in the SIM-Start response
/// * `version_list` - The versions offered in AT_VERSION_LIST, in order
/// * `selected_version` - The version chosen in AT_SELECTED_VERSION
pub fn derive_mk_sim(
    identity: &[u8],
    kcs: &[[u8; KC_LEN]],
    nonce_mt: &[u8; NONCE_LEN],
    version_list: &[u16],
    selected_version: u16,
) -> MasterKey {
    let mut sha1 = Sha1::new();
    sha1.update(identity);
    for kc in kcs {
        sha1.update(kc);
    }
    sha1.update(nonce_mt);
    for version in version_list {
        sha1.update(version.to_be_bytes());
    }
    sha1.update(selected_version.to_be_bytes());
    MasterKey(sha1.finalize().into())
}

/// Derive the EAP-AKA master key: MK = SHA1(Identity | IK | CK).
pub fn derive_mk_aka(identity: &[u8], ik: &[u8; IK_LEN], ck: &[u8; CK_LEN]) -> MasterKey {
    let mut sha1 = Sha1::new();
    sha1.update(identity);
    sha1.update(ik);
    sha1.update(ck);
    MasterKey(sha1.finalize().into())
}

/// Expand MK into the full-authentication key bundle.
pub fn derive_session_keys(mk: &MasterKey) -> SessionKeys {
    let mut xkey = [0u8; SEED_LEN];
    xkey.copy_from_slice(&mk.0);
    let mut stream = fips186_2_prf(&xkey, K_ENCR_LEN + K_AUT_LEN + MSK_LEN + EMSK_LEN);
    xkey.zeroize();

    let mut keys = SessionKeys {
        k_encr: [0; K_ENCR_LEN],
        k_aut: [0; K_AUT_LEN],
        msk: [0; MSK_LEN],
        emsk: [0; EMSK_LEN],
    };
    keys.k_encr.copy_from_slice(&stream[..16]);
    keys.k_aut.copy_from_slice(&stream[16..32]);
    keys.msk.copy_from_slice(&stream[32..96]);
    keys.emsk.copy_from_slice(&stream[96..160]);
    stream.zeroize();
    keys
}

/// Re-derive MSK/EMSK for a fast re-authentication round.
///
/// K_encr and K_aut are the stored values from the original full
/// authentication and pass through unchanged (RFC 4187#7.2).
pub fn derive_reauth_session_keys(
    reauth_identity: &[u8],
    counter: u16,
    nonce_s: &[u8; NONCE_LEN],
    mk: &MasterKey,
    k_encr: &[u8; K_ENCR_LEN],
    k_aut: &[u8; K_AUT_LEN],
) -> SessionKeys {
    let mut sha1 = Sha1::new();
    sha1.update(reauth_identity);
    sha1.update(counter.to_be_bytes());
    sha1.update(nonce_s);
    sha1.update(&mk.0);
    let mut xkey: [u8; SEED_LEN] = sha1.finalize().into();

    let mut stream = fips186_2_prf(&xkey, MSK_LEN + EMSK_LEN);
    xkey.zeroize();

    let mut keys = SessionKeys {
        k_encr: *k_encr,
        k_aut: *k_aut,
        msk: [0; MSK_LEN],
        emsk: [0; EMSK_LEN],
    };
    keys.msk.copy_from_slice(&stream[..64]);
    keys.emsk.copy_from_slice(&stream[64..128]);
    stream.zeroize();
    keys
}
