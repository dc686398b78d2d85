//! AT_MAC Computation (RFC 4186#10.14, RFC 4187#10.15)
//!
//! The MAC is HMAC-SHA1-128: an HMAC-SHA1 keyed with K_aut over the full
//! EAP packet (with the AT_MAC value field zeroed) followed by
//! subtype-specific extra data, truncated to its first 16 bytes:
//!
//! - EAP-Request/SIM-Challenge: NONCE_MT
//! - EAP-Response/SIM-Challenge: n*SRES
//! - EAP-AKA challenge messages: no extra data
//! - Re-authentication responses: NONCE_S
//!
//! Verification is constant-time; a mismatch is indistinguishable in
//! timing from any other failed comparison.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::attributes::MAC_LEN;
use crate::keys::K_AUT_LEN;

type HmacSha1 = Hmac<Sha1>;

/// Compute the AT_MAC value for a packet.
///
/// # Arguments
/// * `k_aut` - The derived authentication key
/// * `packet` - Full EAP packet bytes with the AT_MAC value zeroed
/// * `seed` - Subtype-specific extra data appended to the packet
pub fn compute_mac(k_aut: &[u8; K_AUT_LEN], packet: &[u8], seed: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha1::new_from_slice(k_aut).expect("HMAC accepts any key length");
    mac.update(packet);
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut output = [0u8; MAC_LEN];
    output.copy_from_slice(&digest[..MAC_LEN]);
    output
}

/// Verify a received AT_MAC value in constant time.
///
/// # Arguments
/// * `k_aut` - The derived authentication key
/// * `packet` - Full EAP packet bytes with the AT_MAC value zeroed
/// * `seed` - Subtype-specific extra data appended to the packet
/// * `received` - The AT_MAC value extracted from the message
pub fn verify_mac(
    k_aut: &[u8; K_AUT_LEN],
    packet: &[u8],
    seed: &[u8],
    received: &[u8; MAC_LEN],
) -> bool {
    let mut mac = HmacSha1::new_from_slice(k_aut).expect("HMAC accepts any key length");
    mac.update(packet);
    mac.update(seed);
    mac.verify_truncated_left(received).is_ok()
}
