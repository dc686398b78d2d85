//! UICC Backend Boundary
//!
//! The card-side authentication algorithm is a synchronous collaborator:
//! the engine formats a challenge, hands it to the [`UiccBackend`], and
//! parses the raw response. Response layouts follow TS 131 102 Section
//! 7.1.2.1:
//!
//! ```text
//! SIM (GSM):        [SRES len][SRES][Kc len][Kc]
//! AKA success:      [0xDB][RES len][RES][CK len][CK][IK len][IK]
//! AKA out-of-sync:  [0xDC][AUTS len][AUTS]
//! ```
//!
//! Length fields are verified against the exact values the RFCs require;
//! a mismatch is reported distinctly from an unknown discriminator tag so
//! the state machine can answer the former with a Client-Error and treat
//! the latter as fatal.

use thiserror::Error;

use simaka_proto::attributes::{AUTN_LEN, AUTS_LEN, RAND_LEN, RES_MAX_LEN, RES_MIN_LEN};
use simaka_proto::keys::{CK_LEN, IK_LEN, KC_LEN};

/// SRES length (GSM 03.20)
pub const SRES_LEN: usize = 4;

/// Response tag for a successful AKA authentication (TS 131 102)
pub const AKA_TAG_SUCCESS: u8 = 0xDB;

/// Response tag for an AKA synchronization failure (TS 131 102)
pub const AKA_TAG_SYNC_FAILURE: u8 = 0xDC;

/// UICC application selector passed with each authentication request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UiccAppType {
    /// GSM algorithm on the SIM application (EAP-SIM)
    EapSim = 128,
    /// UMTS AKA on the USIM application (EAP-AKA / EAP-AKA')
    EapAka = 129,
}

/// Errors surfaced by a [`UiccBackend`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UiccError {
    /// The card rejected the authentication input (for AKA: AUTN refused)
    #[error("authentication rejected by the UICC")]
    AuthenticationRejected,

    /// The backend itself failed (card absent, service unavailable, ...)
    #[error("UICC backend failure: {0}")]
    Backend(String),
}

/// Synchronous card-side authentication.
///
/// Calls may block on hardware; the engine performs no internal timeout.
pub trait UiccBackend: Send + Sync {
    /// Run the card authentication algorithm over a formatted challenge.
    fn authenticate(&self, app_type: UiccAppType, challenge: &[u8]) -> Result<Vec<u8>, UiccError>;
}

/// IMSI lookup for a subscription
pub trait IdentitySource: Send + Sync {
    /// The subscriber identity (IMSI) for the subscription, if available
    fn subscriber_identity(&self, sub_id: u32) -> Option<String>;
}

/// Malformed UICC response errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("truncated UICC response")]
    Truncated,

    #[error("invalid {field} length in UICC response: {actual}")]
    InvalidLength { field: &'static str, actual: usize },

    #[error("invalid UICC response tag: {0:#04x}")]
    InvalidTag(u8),
}

/// One GSM challenge result: SRES and Kc with exact lengths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimChallengeResult {
    pub sres: [u8; SRES_LEN],
    pub kc: [u8; KC_LEN],
}

/// One UMTS challenge result: success or synchronization failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AkaChallengeResult {
    Success {
        res: Vec<u8>,
        ik: [u8; IK_LEN],
        ck: [u8; CK_LEN],
    },
    SynchronizationFailure {
        auts: [u8; AUTS_LEN],
    },
}

/// Format a GSM challenge for the card: [len][RAND]
pub fn format_sim_challenge(rand: &[u8; RAND_LEN]) -> Vec<u8> {
    let mut formatted = Vec::with_capacity(1 + RAND_LEN);
    formatted.push(RAND_LEN as u8);
    formatted.extend_from_slice(rand);
    formatted
}

/// Format a UMTS challenge for the card: [len][RAND][len][AUTN]
pub fn format_aka_challenge(rand: &[u8; RAND_LEN], autn: &[u8; AUTN_LEN]) -> Vec<u8> {
    let mut formatted = Vec::with_capacity(2 + RAND_LEN + AUTN_LEN);
    formatted.push(RAND_LEN as u8);
    formatted.extend_from_slice(rand);
    formatted.push(AUTN_LEN as u8);
    formatted.extend_from_slice(autn);
    formatted
}

/// Cursor over a length-prefixed UICC response
struct ResponseCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ResponseCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ResponseCursor { bytes, offset: 0 }
    }

    fn take_u8(&mut self) -> Result<u8, ResponseError> {
        let byte = *self
            .bytes
            .get(self.offset)
            .ok_or(ResponseError::Truncated)?;
        self.offset += 1;
        Ok(byte)
    }

    fn take_field(&mut self) -> Result<&'a [u8], ResponseError> {
        let len = self.take_u8()? as usize;
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(ResponseError::Truncated);
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}

/// Parse a SIM authentication response: [SRES len][SRES][Kc len][Kc]
pub fn parse_sim_response(bytes: &[u8]) -> Result<SimChallengeResult, ResponseError> {
    let mut cursor = ResponseCursor::new(bytes);

    let sres = cursor.take_field()?;
    let sres: [u8; SRES_LEN] = sres.try_into().map_err(|_| ResponseError::InvalidLength {
        field: "SRES",
        actual: sres.len(),
    })?;

    let kc = cursor.take_field()?;
    let kc: [u8; KC_LEN] = kc.try_into().map_err(|_| ResponseError::InvalidLength {
        field: "Kc",
        actual: kc.len(),
    })?;

    Ok(SimChallengeResult { sres, kc })
}

/// Parse an AKA authentication response, discriminated by the leading tag.
pub fn parse_aka_response(bytes: &[u8]) -> Result<AkaChallengeResult, ResponseError> {
    let mut cursor = ResponseCursor::new(bytes);

    match cursor.take_u8()? {
        AKA_TAG_SUCCESS => {
            let res = cursor.take_field()?;
            if !(RES_MIN_LEN..=RES_MAX_LEN).contains(&res.len()) {
                return Err(ResponseError::InvalidLength {
                    field: "RES",
                    actual: res.len(),
                });
            }
            let res = res.to_vec();

            let ck_bytes = cursor.take_field()?;
            let ck: [u8; CK_LEN] =
                ck_bytes
                    .try_into()
                    .map_err(|_| ResponseError::InvalidLength {
                        field: "CK",
                        actual: ck_bytes.len(),
                    })?;

            let ik_bytes = cursor.take_field()?;
            let ik: [u8; IK_LEN] =
                ik_bytes
                    .try_into()
                    .map_err(|_| ResponseError::InvalidLength {
                        field: "IK",
                        actual: ik_bytes.len(),
                    })?;

            Ok(AkaChallengeResult::Success { res, ik, ck })
        }
        AKA_TAG_SYNC_FAILURE => {
            let auts = cursor.take_field()?;
            let auts: [u8; AUTS_LEN] =
                auts.try_into().map_err(|_| ResponseError::InvalidLength {
                    field: "AUTS",
                    actual: auts.len(),
                })?;
            Ok(AkaChallengeResult::SynchronizationFailure { auts })
        }
        tag => Err(ResponseError::InvalidTag(tag)),
    }
}
