//! EAP-SIM/AKA Attributes
//!
//! Typed representation of the SIM/AKA attribute family defined in RFC 4186
//! and RFC 4187 and registered with IANA. The state machines operate on
//! these values only; the TLV wire encoding lives behind the
//! [`AttributeCodec`](crate::codec::AttributeCodec) boundary.
//!
//! Constructors enforce the fixed lengths the RFCs assign (NONCE_MT 16B,
//! AUTS 14B, RES 4..=16B, ...), so a decoded attribute that reaches the
//! state machine is already structurally sound.

use thiserror::Error;

/// NONCE_MT / NONCE_S length (RFC 4186#10.4, RFC 4187#10.19)
pub const NONCE_LEN: usize = 16;

/// RAND length for both SIM and AKA challenges (RFC 4186#10.9, RFC 4187#10.6)
pub const RAND_LEN: usize = 16;

/// AUTN length (RFC 4187#10.7)
pub const AUTN_LEN: usize = 16;

/// AUTS length (RFC 4187#10.9)
pub const AUTS_LEN: usize = 14;

/// AT_MAC value length (RFC 4186#10.14)
pub const MAC_LEN: usize = 16;

/// AT_IV value length (RFC 4186#10.12)
pub const IV_LEN: usize = 16;

/// Minimum RES length in bytes (RFC 4187#10.8, TS 133 105#5.1.7.8)
pub const RES_MIN_LEN: usize = 4;

/// Maximum RES length in bytes (RFC 4187#10.8)
pub const RES_MAX_LEN: usize = 16;

/// Attribute-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("invalid {attribute} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("RES length must be {RES_MIN_LEN}..={RES_MAX_LEN} bytes, got {0}")]
    InvalidResLength(usize),

    #[error("missing required attribute: {0:?}")]
    Missing(AttributeKind),
}

/// EAP-SIM/AKA attribute types (IANA EAP-SIM/AKA registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeKind {
    /// AT_RAND (Type 1)
    Rand = 1,
    /// AT_AUTN (Type 2)
    Autn = 2,
    /// AT_RES (Type 3)
    Res = 3,
    /// AT_AUTS (Type 4)
    Auts = 4,
    /// AT_PADDING (Type 6)
    Padding = 6,
    /// AT_NONCE_MT (Type 7)
    NonceMt = 7,
    /// AT_PERMANENT_ID_REQ (Type 10)
    PermanentIdReq = 10,
    /// AT_MAC (Type 11)
    Mac = 11,
    /// AT_NOTIFICATION (Type 12)
    Notification = 12,
    /// AT_ANY_ID_REQ (Type 13)
    AnyIdReq = 13,
    /// AT_IDENTITY (Type 14)
    Identity = 14,
    /// AT_VERSION_LIST (Type 15)
    VersionList = 15,
    /// AT_SELECTED_VERSION (Type 16)
    SelectedVersion = 16,
    /// AT_FULLAUTH_ID_REQ (Type 17)
    FullauthIdReq = 17,
    /// AT_COUNTER (Type 19)
    Counter = 19,
    /// AT_COUNTER_TOO_SMALL (Type 20)
    CounterTooSmall = 20,
    /// AT_NONCE_S (Type 21)
    NonceS = 21,
    /// AT_CLIENT_ERROR_CODE (Type 22)
    ClientErrorCode = 22,
    /// AT_IV (Type 129, skippable range)
    Iv = 129,
    /// AT_ENCR_DATA (Type 130, skippable range)
    EncrData = 130,
    /// AT_NEXT_REAUTH_ID (Type 133, skippable range)
    NextReauthId = 133,
    /// AT_RESULT_IND (Type 135, skippable range)
    ResultInd = 135,
    /// AT_BIDDING (Type 136, skippable range)
    Bidding = 136,
}

impl AttributeKind {
    /// Convert from u8 to AttributeKind
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Rand),
            2 => Some(Self::Autn),
            3 => Some(Self::Res),
            4 => Some(Self::Auts),
            6 => Some(Self::Padding),
            7 => Some(Self::NonceMt),
            10 => Some(Self::PermanentIdReq),
            11 => Some(Self::Mac),
            12 => Some(Self::Notification),
            13 => Some(Self::AnyIdReq),
            14 => Some(Self::Identity),
            15 => Some(Self::VersionList),
            16 => Some(Self::SelectedVersion),
            17 => Some(Self::FullauthIdReq),
            19 => Some(Self::Counter),
            20 => Some(Self::CounterTooSmall),
            21 => Some(Self::NonceS),
            22 => Some(Self::ClientErrorCode),
            129 => Some(Self::Iv),
            130 => Some(Self::EncrData),
            133 => Some(Self::NextReauthId),
            135 => Some(Self::ResultInd),
            136 => Some(Self::Bidding),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// AT_CLIENT_ERROR_CODE values (RFC 4186#10.19)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientErrorCode {
    /// "unable to process packet" (0)
    UnableToProcess = 0,
    /// "unsupported version" (1)
    UnsupportedVersion = 1,
    /// "insufficient number of challenges" (2)
    InsufficientChallenges = 2,
    /// "RANDs are not fresh" (3)
    RandsNotFresh = 3,
}

impl ClientErrorCode {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::UnableToProcess),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::InsufficientChallenges),
            3 => Some(Self::RandsNotFresh),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// AT_NOTIFICATION status code (RFC 4186#10.18)
///
/// The two high bits carry protocol meaning:
/// - S (0x8000): set for success notifications
/// - P (0x4000): set when the notification is delivered before any
///   authentication round has completed ("phase bit")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCode(pub u16);

impl NotificationCode {
    /// General failure after authentication (0)
    pub const GENERAL_FAILURE_POST_CHALLENGE: NotificationCode = NotificationCode(0);

    /// General failure before authentication (16384)
    pub const GENERAL_FAILURE_PRE_CHALLENGE: NotificationCode = NotificationCode(16384);

    /// Success; "User has been successfully authenticated" (32768)
    pub const SUCCESS: NotificationCode = NotificationCode(32768);

    /// S bit: notification indicates success
    pub fn is_success(self) -> bool {
        self.0 & 0x8000 != 0
    }

    /// P bit: notification was delivered before a completed challenge round
    pub fn is_pre_challenge(self) -> bool {
        self.0 & 0x4000 != 0
    }
}

/// A single decoded EAP-SIM/AKA attribute.
///
/// Variants with fixed-length payloads use arrays so a value that exists is
/// a value with the right shape; variable-length payloads (RES, identities)
/// are validated by their constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// AT_VERSION_LIST: protocol versions offered by the server (EAP-SIM)
    VersionList(Vec<u16>),
    /// AT_SELECTED_VERSION: version chosen by the peer (EAP-SIM)
    SelectedVersion(u16),
    /// AT_NONCE_MT: peer-chosen nonce for EAP-SIM key derivation
    NonceMt([u8; NONCE_LEN]),
    /// AT_PERMANENT_ID_REQ: server asks for the permanent identity
    PermanentIdReq,
    /// AT_ANY_ID_REQ: server accepts any identity (reauth id preferred)
    AnyIdReq,
    /// AT_FULLAUTH_ID_REQ: server asks for a full-authentication identity
    FullauthIdReq,
    /// AT_IDENTITY: identity bytes sent by the peer
    Identity(Vec<u8>),
    /// AT_RAND carrying the 2..3 GSM challenges of an EAP-SIM challenge
    RandSim(Vec<[u8; RAND_LEN]>),
    /// AT_RAND carrying the single UMTS challenge of an EAP-AKA challenge
    RandAka([u8; RAND_LEN]),
    /// AT_AUTN: network authentication token (EAP-AKA)
    Autn([u8; AUTN_LEN]),
    /// AT_RES: authentication result (EAP-AKA), 4..=16 bytes
    Res(Vec<u8>),
    /// AT_AUTS: synchronization-failure token (EAP-AKA)
    Auts([u8; AUTS_LEN]),
    /// AT_MAC: message authentication code over the full EAP packet
    Mac([u8; MAC_LEN]),
    /// AT_IV: initialization vector for AT_ENCR_DATA
    Iv([u8; IV_LEN]),
    /// AT_ENCR_DATA: AES-128-CBC protected nested attributes
    EncrData(Vec<u8>),
    /// AT_PADDING inside an encrypted payload; length in bytes
    Padding(usize),
    /// AT_COUNTER: fast re-authentication counter
    Counter(u16),
    /// AT_COUNTER_TOO_SMALL: peer signals a replayed counter
    CounterTooSmall,
    /// AT_NONCE_S: server nonce for re-authentication key derivation
    NonceS([u8; NONCE_LEN]),
    /// AT_NOTIFICATION status code
    Notification(NotificationCode),
    /// AT_CLIENT_ERROR_CODE sent with a Client-Error response
    ClientError(ClientErrorCode),
    /// AT_NEXT_REAUTH_ID: identity to use for the next fast re-authentication
    NextReauthId(Vec<u8>),
    /// AT_RESULT_IND: protected result indication offered
    ResultInd,
    /// AT_BIDDING: server announces whether it prefers EAP-AKA' (RFC 5448#4)
    Bidding {
        server_supports_aka_prime: bool,
    },
}

impl Attribute {
    /// Construct an AT_RES attribute, enforcing the RFC 4187 length bounds
    pub fn res(res: Vec<u8>) -> Result<Self, AttributeError> {
        if !Self::is_valid_res_len(res.len()) {
            return Err(AttributeError::InvalidResLength(res.len()));
        }
        Ok(Attribute::Res(res))
    }

    /// Construct an AT_AUTS attribute from a slice, enforcing the 14B length
    pub fn auts(auts: &[u8]) -> Result<Self, AttributeError> {
        let fixed: [u8; AUTS_LEN] =
            auts.try_into().map_err(|_| AttributeError::InvalidLength {
                attribute: "AT_AUTS",
                expected: AUTS_LEN,
                actual: auts.len(),
            })?;
        Ok(Attribute::Auts(fixed))
    }

    /// Check whether the given RES length is valid (RFC 4187#10.8)
    pub fn is_valid_res_len(len_bytes: usize) -> bool {
        (RES_MIN_LEN..=RES_MAX_LEN).contains(&len_bytes)
    }

    /// The attribute type this value belongs to
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::VersionList(_) => AttributeKind::VersionList,
            Attribute::SelectedVersion(_) => AttributeKind::SelectedVersion,
            Attribute::NonceMt(_) => AttributeKind::NonceMt,
            Attribute::PermanentIdReq => AttributeKind::PermanentIdReq,
            Attribute::AnyIdReq => AttributeKind::AnyIdReq,
            Attribute::FullauthIdReq => AttributeKind::FullauthIdReq,
            Attribute::Identity(_) => AttributeKind::Identity,
            Attribute::RandSim(_) | Attribute::RandAka(_) => AttributeKind::Rand,
            Attribute::Autn(_) => AttributeKind::Autn,
            Attribute::Res(_) => AttributeKind::Res,
            Attribute::Auts(_) => AttributeKind::Auts,
            Attribute::Mac(_) => AttributeKind::Mac,
            Attribute::Iv(_) => AttributeKind::Iv,
            Attribute::EncrData(_) => AttributeKind::EncrData,
            Attribute::Padding(_) => AttributeKind::Padding,
            Attribute::Counter(_) => AttributeKind::Counter,
            Attribute::CounterTooSmall => AttributeKind::CounterTooSmall,
            Attribute::NonceS(_) => AttributeKind::NonceS,
            Attribute::Notification(_) => AttributeKind::Notification,
            Attribute::ClientError(_) => AttributeKind::ClientErrorCode,
            Attribute::NextReauthId(_) => AttributeKind::NextReauthId,
            Attribute::ResultInd => AttributeKind::ResultInd,
            Attribute::Bidding { .. } => AttributeKind::Bidding,
        }
    }
}
