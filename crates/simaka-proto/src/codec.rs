//! Attribute Codec Boundary
//!
//! The state machines never touch TLV bytes. An [`AttributeCodec`]
//! implementation owns the wire format: it turns raw type-data into a
//! [`TypeData`] (subtype plus typed attributes) and encodes responses back
//! into packet bytes. The full-packet encoding is also what AT_MAC is
//! computed over, so both sides of the MAC calculation go through the same
//! implementation.
//!
//! A decode failure that the protocol can answer (truncated attribute,
//! unknown non-skippable attribute, ...) surfaces as a
//! [`DecodeResult::ClientError`]; the engine answers it with a
//! Client-Error response rather than tearing the session down.

use crate::attributes::{Attribute, AttributeKind, ClientErrorCode};
use crate::message::EapCode;
use thiserror::Error;

/// EAP-SIM/AKA subtypes (RFC 4186#11, RFC 4187#11; shared numbering space)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Subtype {
    /// AKA-Challenge (Subtype 1)
    AkaChallenge = 1,
    /// AKA-Authentication-Reject (Subtype 2)
    AkaAuthenticationReject = 2,
    /// AKA-Synchronization-Failure (Subtype 4)
    AkaSynchronizationFailure = 4,
    /// AKA-Identity (Subtype 5)
    AkaIdentity = 5,
    /// SIM-Start (Subtype 10)
    SimStart = 10,
    /// SIM-Challenge (Subtype 11)
    SimChallenge = 11,
    /// SIM-Notification / AKA-Notification (Subtype 12)
    Notification = 12,
    /// Re-authentication (Subtype 13)
    Reauthentication = 13,
    /// Client-Error (Subtype 14)
    ClientError = 14,
}

impl Subtype {
    /// Convert from u8 to Subtype
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::AkaChallenge),
            2 => Some(Self::AkaAuthenticationReject),
            4 => Some(Self::AkaSynchronizationFailure),
            5 => Some(Self::AkaIdentity),
            10 => Some(Self::SimStart),
            11 => Some(Self::SimChallenge),
            12 => Some(Self::Notification),
            13 => Some(Self::Reauthentication),
            14 => Some(Self::ClientError),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded method type-data: subtype plus attributes in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeData {
    pub subtype: Subtype,
    pub attributes: Vec<Attribute>,
}

impl TypeData {
    /// Create type-data from a subtype and attribute list
    pub fn new(subtype: Subtype, attributes: Vec<Attribute>) -> Self {
        TypeData {
            subtype,
            attributes,
        }
    }

    /// Find the first attribute of the given kind
    pub fn find(&self, kind: AttributeKind) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.kind() == kind)
    }

    /// Check whether an attribute of the given kind is present
    pub fn contains(&self, kind: AttributeKind) -> bool {
        self.find(kind).is_some()
    }

    /// Count how many of the given kinds are present at least once
    pub fn count_present(&self, kinds: &[AttributeKind]) -> usize {
        kinds.iter().filter(|kind| self.contains(**kind)).count()
    }
}

/// Result of decoding raw type-data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// Successfully decoded subtype and attributes
    TypeData(TypeData),
    /// The payload was malformed in a way the protocol answers with a
    /// Client-Error response carrying this code
    ClientError(ClientErrorCode),
}

/// Codec-level errors (secured-payload decoding)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated attribute payload at offset {0}")]
    Truncated(usize),

    #[error("malformed attribute of type {0}")]
    MalformedAttribute(u8),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Wire codec for EAP-SIM/AKA type-data.
///
/// Implementations must be deterministic: encoding the same packet twice
/// must yield identical bytes, since the MAC calculation re-encodes the
/// message with a zeroed AT_MAC and compares against the received bytes'
/// digest.
pub trait AttributeCodec: Send + Sync {
    /// Decode raw method type-data into a subtype and attribute list
    fn decode(&self, type_data: &[u8]) -> DecodeResult;

    /// Decode a decrypted AT_ENCR_DATA interior into attributes.
    ///
    /// AT_PADDING is surfaced as an attribute; callers ignore it.
    fn decode_attributes(&self, plaintext: &[u8]) -> Result<Vec<Attribute>, CodecError>;

    /// Encode an attribute list (no subtype header), used for the interior
    /// of AT_ENCR_DATA. The output must be padded with AT_PADDING to a
    /// multiple of the AES block size (16 bytes).
    fn encode_attributes(&self, attributes: &[Attribute]) -> Vec<u8>;

    /// Encode a full EAP packet image: code, identifier, method type,
    /// subtype, attributes. This is both the bytes put on the wire and the
    /// input to AT_MAC computation.
    fn encode_packet(
        &self,
        code: EapCode,
        identifier: u8,
        method_type: u8,
        subtype: Subtype,
        attributes: &[Attribute],
    ) -> Vec<u8>;
}
