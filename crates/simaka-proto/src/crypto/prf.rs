//! FIPS 186-2 Pseudo-Random Function
//!
//! Key expansion for EAP-SIM and EAP-AKA uses the FIPS 186-2 pseudo-random
//! number generator (with the change notice applied, and without the mod q
//! reduction), as required by RFC 4186 Section 7 and RFC 4187 Section 7.
//!
//! The generator is driven by the SHA-1 compression function G(t, c): the
//! 160-bit input c is zero-padded to a 512-bit block and compressed with
//! the standard SHA-1 initial state. Each outer round produces 40 bytes:
//!
//! ```text
//! for j in 0..rounds:
//!     for i in 0..2:
//!         w_i  = G(t, XKEY)
//!         XKEY = (1 + XKEY + w_i) mod 2^160
//!     x_j = w_0 | w_1
//! ```

use sha1::compress;
use sha1::digest::generic_array::{typenum::U64, GenericArray};

/// Seed (XKEY) length in bytes: 160 bits
pub const SEED_LEN: usize = 20;

/// Output bytes produced per outer round
const ROUND_LEN: usize = 2 * SEED_LEN;

/// SHA-1 initial state, used as the constant t of the G function
const SHA1_INIT: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

/// G(t, c): one application of the SHA-1 compression function to the
/// zero-padded 160-bit input. No length padding is appended; this is the
/// raw transform, not the full hash.
fn g_function(c: &[u8; SEED_LEN]) -> [u8; SEED_LEN] {
    let mut state = SHA1_INIT;
    let mut block: GenericArray<u8, U64> = GenericArray::default();
    block[..SEED_LEN].copy_from_slice(c);
    compress(&mut state, core::slice::from_ref(&block));

    let mut out = [0u8; SEED_LEN];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// (a + b + carry_in) mod 2^160 over big-endian 20-byte integers
fn add_mod_2_160(a: &mut [u8; SEED_LEN], b: &[u8; SEED_LEN], mut carry: u16) {
    for i in (0..SEED_LEN).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        a[i] = sum as u8;
        carry = sum >> 8;
    }
}

/// Expand `xkey` into `output_len` pseudo-random bytes.
///
/// Whole 40-byte rounds are generated and the result truncated, matching
/// the RFC 4186 Section 7 usage (160 bytes for full authentication, 128
/// bytes for fast re-authentication).
pub fn fips186_2_prf(xkey: &[u8; SEED_LEN], output_len: usize) -> Vec<u8> {
    let mut xkey = *xkey;
    let rounds = output_len.div_ceil(ROUND_LEN);
    let mut output = Vec::with_capacity(rounds * ROUND_LEN);

    for _ in 0..rounds {
        for _ in 0..2 {
            let w = g_function(&xkey);
            output.extend_from_slice(&w);
            // XKEY = (1 + XKEY + w) mod 2^160
            add_mod_2_160(&mut xkey, &w, 1);
        }
    }

    output.truncate(output_len);
    output
}
