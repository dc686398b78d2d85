//! EAP-SIM / EAP-AKA Protocol Support
//!
//! This crate provides the protocol-level building blocks for the EAP-SIM
//! (RFC 4186) and EAP-AKA (RFC 4187) authentication methods:
//!
//! - The EAP message shell (code, identifier, method type, type-data)
//! - The typed SIM/AKA attribute model (AT_RAND, AT_MAC, AT_AUTN, ...)
//! - The attribute codec boundary used by the method engine
//! - Message authentication (HMAC-SHA1-128 over the full EAP packet)
//! - The FIPS 186-2 pseudo-random function used for key expansion
//! - AES-128-CBC protection for AT_ENCR_DATA secured attributes
//! - Master key and session key derivation
//!
//! The method state machines themselves live in the `simaka-peer` crate.
//!
//! # Example
//!
//! ```rust
//! use simaka_proto::keys::{derive_mk_aka, derive_session_keys};
//!
//! let mk = derive_mk_aka(b"0123456789012345", &[0x11; 16], &[0x22; 16]);
//! let keys = derive_session_keys(&mk);
//! assert_eq!(keys.msk.len(), 64);
//! assert_eq!(keys.emsk.len(), 64);
//! ```

pub mod attributes;
pub mod codec;
pub mod crypto;
pub mod keys;
pub mod message;

pub use attributes::{
    Attribute, AttributeError, AttributeKind, ClientErrorCode, NotificationCode,
};
pub use codec::{AttributeCodec, CodecError, DecodeResult, Subtype, TypeData};
pub use keys::{MasterKey, SessionKeys};
pub use message::{EapCode, EapMessage, EAP_TYPE_AKA, EAP_TYPE_AKA_PRIME, EAP_TYPE_SIM};
