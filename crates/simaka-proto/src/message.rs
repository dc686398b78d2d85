//! EAP Message Shell
//!
//! The outer EAP packet structure as defined in RFC 3748, reduced to what a
//! method implementation needs once the transport has reassembled a packet:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Framing, fragmentation, and retransmission are the transport's problem;
//! the method engine receives [`EapMessage`] values with the type-data still
//! opaque and hands them to the attribute codec.

/// EAP packet code (RFC 3748 Section 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    /// Request packet (Code 1)
    Request = 1,
    /// Response packet (Code 2)
    Response = 2,
    /// Success packet (Code 3)
    Success = 3,
    /// Failure packet (Code 4)
    Failure = 4,
}

impl EapCode {
    /// Convert from u8 to EapCode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// EAP-SIM method type (Type 18) - RFC 4186
pub const EAP_TYPE_SIM: u8 = 18;

/// EAP-AKA method type (Type 23) - RFC 4187
pub const EAP_TYPE_AKA: u8 = 23;

/// EAP-AKA' method type (Type 50) - RFC 5448
pub const EAP_TYPE_AKA_PRIME: u8 = 50;

/// Human-readable name for a SIM/AKA-family method type
pub fn method_type_name(method_type: u8) -> &'static str {
    match method_type {
        EAP_TYPE_SIM => "EAP-SIM",
        EAP_TYPE_AKA => "EAP-AKA",
        EAP_TYPE_AKA_PRIME => "EAP-AKA'",
        _ => "unknown",
    }
}

/// A reassembled EAP packet as seen by a method implementation.
///
/// Success and Failure packets carry no type or type-data; Request and
/// Response packets carry the method type and the raw type-data bytes that
/// the attribute codec decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapMessage {
    /// EAP code (Request, Response, Success, Failure)
    pub code: EapCode,
    /// Identifier for matching requests and responses (0-255)
    pub identifier: u8,
    /// EAP method type (only present for Request/Response)
    pub method_type: Option<u8>,
    /// Raw method type-data, opaque to the state machine
    pub type_data: Vec<u8>,
}

impl EapMessage {
    /// Create a method Request carrying raw type-data
    pub fn request(identifier: u8, method_type: u8, type_data: Vec<u8>) -> Self {
        EapMessage {
            code: EapCode::Request,
            identifier,
            method_type: Some(method_type),
            type_data,
        }
    }

    /// Create an EAP Success packet
    pub fn success(identifier: u8) -> Self {
        EapMessage {
            code: EapCode::Success,
            identifier,
            method_type: None,
            type_data: Vec::new(),
        }
    }

    /// Create an EAP Failure packet
    pub fn failure(identifier: u8) -> Self {
        EapMessage {
            code: EapCode::Failure,
            identifier,
            method_type: None,
            type_data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eap_code_from_u8() {
        assert_eq!(EapCode::from_u8(1), Some(EapCode::Request));
        assert_eq!(EapCode::from_u8(2), Some(EapCode::Response));
        assert_eq!(EapCode::from_u8(3), Some(EapCode::Success));
        assert_eq!(EapCode::from_u8(4), Some(EapCode::Failure));
        assert_eq!(EapCode::from_u8(0), None);
        assert_eq!(EapCode::from_u8(5), None);
    }

    #[test]
    fn test_eap_code_roundtrip() {
        for code in [
            EapCode::Request,
            EapCode::Response,
            EapCode::Success,
            EapCode::Failure,
        ] {
            assert_eq!(EapCode::from_u8(code.as_u8()), Some(code));
        }
    }

    #[test]
    fn test_method_type_names() {
        assert_eq!(method_type_name(EAP_TYPE_SIM), "EAP-SIM");
        assert_eq!(method_type_name(EAP_TYPE_AKA), "EAP-AKA");
        assert_eq!(method_type_name(EAP_TYPE_AKA_PRIME), "EAP-AKA'");
        assert_eq!(method_type_name(4), "unknown");
    }

    #[test]
    fn test_success_failure_have_no_type() {
        assert_eq!(EapMessage::success(7).method_type, None);
        assert_eq!(EapMessage::failure(7).method_type, None);
        assert!(EapMessage::success(7).type_data.is_empty());
    }
}
