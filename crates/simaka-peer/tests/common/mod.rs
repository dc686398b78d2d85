//! Shared fakes for the state machine integration tests: a self-consistent
//! attribute codec, programmable UICC backends, and a canned identity
//! source. The codec's wire format is test-local; the engine only requires
//! determinism, which is exactly what the MAC tests exercise.

// each test binary uses a different slice of these fakes
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use simaka_peer::backend::{AKA_TAG_SUCCESS, AKA_TAG_SYNC_FAILURE};
use simaka_peer::{IdentitySource, UiccAppType, UiccBackend, UiccError};
use simaka_proto::attributes::{Attribute, AttributeKind, ClientErrorCode, NotificationCode};
use simaka_proto::codec::{AttributeCodec, CodecError, DecodeResult, Subtype, TypeData};
use simaka_proto::message::EapCode;

pub const IMSI: &str = "999999999";

/// Length-prefixed TLV codec: attributes are [kind][len u16][payload].
pub struct FakeCodec;

impl FakeCodec {
    fn encode_attribute(attribute: &Attribute, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        match attribute {
            Attribute::VersionList(versions) => {
                for version in versions {
                    payload.extend_from_slice(&version.to_be_bytes());
                }
            }
            Attribute::SelectedVersion(version) => {
                payload.extend_from_slice(&version.to_be_bytes())
            }
            Attribute::NonceMt(bytes) | Attribute::NonceS(bytes) => {
                payload.extend_from_slice(bytes)
            }
            Attribute::PermanentIdReq
            | Attribute::AnyIdReq
            | Attribute::FullauthIdReq
            | Attribute::CounterTooSmall
            | Attribute::ResultInd => {}
            Attribute::Identity(bytes)
            | Attribute::NextReauthId(bytes)
            | Attribute::Res(bytes)
            | Attribute::EncrData(bytes) => payload.extend_from_slice(bytes),
            Attribute::RandSim(rands) => {
                for rand in rands {
                    payload.extend_from_slice(rand);
                }
            }
            Attribute::RandAka(bytes) | Attribute::Autn(bytes) => {
                payload.extend_from_slice(bytes)
            }
            Attribute::Auts(bytes) => payload.extend_from_slice(bytes),
            Attribute::Mac(bytes) | Attribute::Iv(bytes) => payload.extend_from_slice(bytes),
            Attribute::Padding(len) => payload.resize(*len, 0),
            Attribute::Counter(value) => payload.extend_from_slice(&value.to_be_bytes()),
            Attribute::Notification(code) => payload.extend_from_slice(&code.0.to_be_bytes()),
            Attribute::ClientError(code) => {
                payload.extend_from_slice(&code.as_u16().to_be_bytes())
            }
            Attribute::Bidding {
                server_supports_aka_prime,
            } => payload.push(*server_supports_aka_prime as u8),
        }

        out.push(attribute.kind().as_u8());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&payload);
    }

    fn decode_attribute(kind: u8, payload: &[u8]) -> Result<Attribute, CodecError> {
        let kind = AttributeKind::from_u8(kind).ok_or(CodecError::MalformedAttribute(kind))?;
        let malformed = || CodecError::MalformedAttribute(kind.as_u8());

        fn fixed16(kind: AttributeKind, payload: &[u8]) -> Result<[u8; 16], CodecError> {
            payload
                .try_into()
                .map_err(|_| CodecError::MalformedAttribute(kind.as_u8()))
        }

        fn be_u16(kind: AttributeKind, payload: &[u8]) -> Result<u16, CodecError> {
            let bytes: [u8; 2] = payload
                .try_into()
                .map_err(|_| CodecError::MalformedAttribute(kind.as_u8()))?;
            Ok(u16::from_be_bytes(bytes))
        }

        Ok(match kind {
            AttributeKind::VersionList => {
                if payload.len() % 2 != 0 {
                    return Err(malformed());
                }
                Attribute::VersionList(
                    payload
                        .chunks_exact(2)
                        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                        .collect(),
                )
            }
            AttributeKind::SelectedVersion => {
                Attribute::SelectedVersion(be_u16(kind, payload)?)
            }
            AttributeKind::NonceMt => Attribute::NonceMt(fixed16(kind, payload)?),
            AttributeKind::NonceS => Attribute::NonceS(fixed16(kind, payload)?),
            AttributeKind::PermanentIdReq => Attribute::PermanentIdReq,
            AttributeKind::AnyIdReq => Attribute::AnyIdReq,
            AttributeKind::FullauthIdReq => Attribute::FullauthIdReq,
            AttributeKind::Identity => Attribute::Identity(payload.to_vec()),
            AttributeKind::NextReauthId => Attribute::NextReauthId(payload.to_vec()),
            AttributeKind::Rand => {
                // one 16-byte block is an AKA challenge, several are SIM
                if payload.len() == 16 {
                    Attribute::RandAka(fixed16(kind, payload)?)
                } else if !payload.is_empty() && payload.len() % 16 == 0 {
                    Attribute::RandSim(
                        payload
                            .chunks_exact(16)
                            .map(|chunk| chunk.try_into().unwrap())
                            .collect(),
                    )
                } else {
                    return Err(malformed());
                }
            }
            AttributeKind::Autn => Attribute::Autn(fixed16(kind, payload)?),
            AttributeKind::Res => {
                Attribute::res(payload.to_vec()).map_err(|_| malformed())?
            }
            AttributeKind::Auts => Attribute::auts(payload).map_err(|_| malformed())?,
            AttributeKind::Mac => Attribute::Mac(fixed16(kind, payload)?),
            AttributeKind::Iv => Attribute::Iv(fixed16(kind, payload)?),
            AttributeKind::EncrData => Attribute::EncrData(payload.to_vec()),
            AttributeKind::Padding => Attribute::Padding(payload.len()),
            AttributeKind::Counter => Attribute::Counter(be_u16(kind, payload)?),
            AttributeKind::CounterTooSmall => Attribute::CounterTooSmall,
            AttributeKind::Notification => {
                Attribute::Notification(NotificationCode(be_u16(kind, payload)?))
            }
            AttributeKind::ClientErrorCode => Attribute::ClientError(
                ClientErrorCode::from_u16(be_u16(kind, payload)?).ok_or_else(malformed)?,
            ),
            AttributeKind::ResultInd => Attribute::ResultInd,
            AttributeKind::Bidding => Attribute::Bidding {
                server_supports_aka_prime: payload == [1],
            },
        })
    }

    fn parse_attributes(bytes: &[u8]) -> Result<Vec<Attribute>, CodecError> {
        let mut attributes = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            if offset + 3 > bytes.len() {
                return Err(CodecError::Truncated(offset));
            }
            let kind = bytes[offset];
            let len = u16::from_be_bytes([bytes[offset + 1], bytes[offset + 2]]) as usize;
            offset += 3;
            if offset + len > bytes.len() {
                return Err(CodecError::Truncated(offset));
            }
            attributes.push(Self::decode_attribute(kind, &bytes[offset..offset + len])?);
            offset += len;
        }
        Ok(attributes)
    }

    /// Build raw type-data for an inbound message
    pub fn type_data(&self, subtype: Subtype, attributes: &[Attribute]) -> Vec<u8> {
        let mut bytes = vec![subtype.as_u8()];
        for attribute in attributes {
            Self::encode_attribute(attribute, &mut bytes);
        }
        bytes
    }

    /// Parse an encoded packet back into its parts (test assertions)
    pub fn parse_packet(&self, bytes: &[u8]) -> (EapCode, u8, u8, TypeData) {
        let code = EapCode::from_u8(bytes[0]).expect("valid code");
        let identifier = bytes[1];
        let method_type = bytes[2];
        let subtype = Subtype::from_u8(bytes[3]).expect("valid subtype");
        let attributes = Self::parse_attributes(&bytes[4..]).expect("valid attributes");
        (
            code,
            identifier,
            method_type,
            TypeData::new(subtype, attributes),
        )
    }
}

impl AttributeCodec for FakeCodec {
    fn decode(&self, type_data: &[u8]) -> DecodeResult {
        let Some((&subtype, rest)) = type_data.split_first() else {
            return DecodeResult::ClientError(ClientErrorCode::UnableToProcess);
        };
        let Some(subtype) = Subtype::from_u8(subtype) else {
            return DecodeResult::ClientError(ClientErrorCode::UnableToProcess);
        };
        match Self::parse_attributes(rest) {
            Ok(attributes) => DecodeResult::TypeData(TypeData::new(subtype, attributes)),
            Err(_) => DecodeResult::ClientError(ClientErrorCode::UnableToProcess),
        }
    }

    fn decode_attributes(&self, plaintext: &[u8]) -> Result<Vec<Attribute>, CodecError> {
        Self::parse_attributes(plaintext)
    }

    fn encode_attributes(&self, attributes: &[Attribute]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for attribute in attributes {
            Self::encode_attribute(attribute, &mut bytes);
        }
        // align to the AES block size with AT_PADDING
        if bytes.len() % 16 != 0 {
            let mut gap = 16 - bytes.len() % 16;
            if gap < 3 {
                gap += 16;
            }
            Self::encode_attribute(&Attribute::Padding(gap - 3), &mut bytes);
        }
        bytes
    }

    fn encode_packet(
        &self,
        code: EapCode,
        identifier: u8,
        method_type: u8,
        subtype: Subtype,
        attributes: &[Attribute],
    ) -> Vec<u8> {
        let mut bytes = vec![code.as_u8(), identifier, method_type, subtype.as_u8()];
        for attribute in attributes {
            Self::encode_attribute(attribute, &mut bytes);
        }
        bytes
    }
}

/// Deterministic GSM backend: SRES and Kc are functions of the RAND.
pub struct FakeSimUicc {
    /// Return a structurally broken response (wrong SRES length)
    pub malformed: bool,
}

/// The SRES/Kc pair the fake SIM produces for a RAND
pub fn expected_sim_result(rand: &[u8; 16]) -> ([u8; 4], [u8; 8]) {
    let mut sres = [0u8; 4];
    for (out, byte) in sres.iter_mut().zip(rand.iter()) {
        *out = byte ^ 0x5A;
    }
    let mut kc = [0u8; 8];
    kc.copy_from_slice(&rand[8..]);
    (sres, kc)
}

impl UiccBackend for FakeSimUicc {
    fn authenticate(&self, app_type: UiccAppType, challenge: &[u8]) -> Result<Vec<u8>, UiccError> {
        assert_eq!(app_type, UiccAppType::EapSim);
        assert_eq!(challenge[0], 16);
        let rand: [u8; 16] = challenge[1..17].try_into().unwrap();

        if self.malformed {
            return Ok(vec![3, 1, 2, 3]);
        }

        let (sres, kc) = expected_sim_result(&rand);
        let mut response = vec![4];
        response.extend_from_slice(&sres);
        response.push(8);
        response.extend_from_slice(&kc);
        Ok(response)
    }
}

/// Behaviour of the fake USIM for the next challenge
#[derive(Clone)]
pub enum AkaMode {
    Success,
    SyncFailure([u8; 14]),
    Reject,
    Malformed(Vec<u8>),
}

/// Programmable USIM backend; the mode can be swapped mid-session.
pub struct FakeAkaUicc {
    pub mode: Mutex<AkaMode>,
}

impl FakeAkaUicc {
    pub fn new(mode: AkaMode) -> Self {
        FakeAkaUicc {
            mode: Mutex::new(mode),
        }
    }

    pub fn set_mode(&self, mode: AkaMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

/// The RES/IK/CK triple the fake USIM produces for a RAND
pub fn expected_aka_result(rand: &[u8; 16]) -> (Vec<u8>, [u8; 16], [u8; 16]) {
    let res = rand[..8].to_vec();
    let mut ik = [0u8; 16];
    let mut ck = [0u8; 16];
    for i in 0..16 {
        ik[i] = rand[i] ^ 0x17;
        ck[i] = rand[i] ^ 0xC3;
    }
    (res, ik, ck)
}

impl UiccBackend for FakeAkaUicc {
    fn authenticate(&self, app_type: UiccAppType, challenge: &[u8]) -> Result<Vec<u8>, UiccError> {
        assert_eq!(app_type, UiccAppType::EapAka);
        assert_eq!(challenge[0], 16);
        let rand: [u8; 16] = challenge[1..17].try_into().unwrap();

        match self.mode.lock().unwrap().clone() {
            AkaMode::Success => {
                let (res, ik, ck) = expected_aka_result(&rand);
                let mut response = vec![AKA_TAG_SUCCESS, res.len() as u8];
                response.extend_from_slice(&res);
                response.push(16);
                response.extend_from_slice(&ck);
                response.push(16);
                response.extend_from_slice(&ik);
                Ok(response)
            }
            AkaMode::SyncFailure(auts) => {
                let mut response = vec![AKA_TAG_SYNC_FAILURE, 14];
                response.extend_from_slice(&auts);
                Ok(response)
            }
            AkaMode::Reject => Err(UiccError::AuthenticationRejected),
            AkaMode::Malformed(bytes) => Ok(bytes),
        }
    }
}

/// Identity source returning a fixed IMSI (or nothing)
pub struct FakeIdentitySource(pub Option<String>);

impl IdentitySource for FakeIdentitySource {
    fn subscriber_identity(&self, _sub_id: u32) -> Option<String> {
        self.0.clone()
    }
}

pub fn codec() -> Arc<FakeCodec> {
    Arc::new(FakeCodec)
}

pub fn identities() -> Arc<FakeIdentitySource> {
    Arc::new(FakeIdentitySource(Some(IMSI.to_string())))
}
