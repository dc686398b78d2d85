//! Method Outcomes
//!
//! Everything a method state machine can hand back to its caller for one
//! inbound message: an outbound response packet, a terminal success with
//! the derived key bundle, a terminal failure, or a fatal error the
//! protocol cannot answer.

use crate::machine::MethodError;

/// Terminal success payload released to the caller exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct EapSuccess {
    /// Master session key, at least 64 bytes
    pub msk: Vec<u8>,
    /// Extended master session key, at least 64 bytes
    pub emsk: Vec<u8>,
    /// Re-authentication identity to provision into the next session's
    /// configuration, if the server offered one
    pub next_reauth_id: Option<Vec<u8>>,
}

impl std::fmt::Debug for EapSuccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapSuccess")
            .field("msk_len", &self.msk.len())
            .field("emsk_len", &self.emsk.len())
            .field("next_reauth_id", &self.next_reauth_id.is_some())
            .finish()
    }
}

/// Result of processing one inbound EAP message.
#[derive(Debug)]
pub enum EapResult {
    /// Outbound response packet bytes for the transport to deliver
    Response(Vec<u8>),
    /// Authentication completed; session is terminal
    Success(EapSuccess),
    /// Server signalled failure; session is terminal
    Failure,
    /// Unrecoverable error; the session cannot continue
    Error(MethodError),
}

impl EapResult {
    /// The response bytes, if this outcome is a response
    pub fn as_response(&self) -> Option<&[u8]> {
        match self {
            EapResult::Response(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_response() {
        let result = EapResult::Response(vec![1, 2, 3]);
        assert_eq!(result.as_response(), Some(&[1u8, 2, 3][..]));
        assert!(EapResult::Failure.as_response().is_none());
    }

    #[test]
    fn test_success_debug_hides_keys() {
        let success = EapSuccess {
            msk: vec![0x55; 64],
            emsk: vec![0x66; 64],
            next_reauth_id: None,
        };
        let rendered = format!("{:?}", success);
        assert!(rendered.contains("msk_len"));
        assert!(!rendered.contains("0x55"));
        assert!(!rendered.contains("85"));
    }
}
