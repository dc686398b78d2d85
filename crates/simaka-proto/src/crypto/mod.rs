//! Cryptographic toolbox for EAP-SIM/AKA
//!
//! - [`prf`]: the FIPS 186-2 pseudo-random function used for session key
//!   expansion (RFC 4186#7, RFC 4187#7)
//! - [`mac`]: HMAC-SHA1-128 computation and verification for AT_MAC
//! - [`encr`]: AES-128-CBC protection for AT_ENCR_DATA secured attributes

pub mod encr;
pub mod mac;
pub mod prf;
