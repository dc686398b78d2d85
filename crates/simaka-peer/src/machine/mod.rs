//! Method State Machine Base
//!
//! Cross-cutting behaviour shared by the EAP-SIM and EAP-AKA machines:
//! interception of EAP-Success/EAP-Failure, method-type checking,
//! Client-Error construction, AT_MAC validation and attachment,
//! AT_ENCR_DATA handling, and SIM/AKA-Notification processing.
//!
//! Each method machine owns a [`SessionCore`] holding the session-wide
//! mutable fields (derived keys, notification flag, expecting-failure
//! flag) and drives its own state enum through a transition-and-process
//! loop: a state either produces a result or transitions and re-dispatches
//! the same message into the next state.

use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use simaka_proto::attributes::{
    Attribute, AttributeError, AttributeKind, ClientErrorCode, IV_LEN, NONCE_LEN,
};
use simaka_proto::codec::{AttributeCodec, CodecError, DecodeResult, Subtype, TypeData};
use simaka_proto::crypto::encr::{decrypt_encr_data, encrypt_encr_data};
use simaka_proto::crypto::mac::{compute_mac, verify_mac};
use simaka_proto::keys::{MasterKey, SessionKeys, K_ENCR_LEN};
use simaka_proto::message::{method_type_name, EapCode, EapMessage};

use crate::backend::{IdentitySource, UiccBackend, UiccError};
use crate::result::EapResult;

pub mod aka;
pub mod sim;

/// Unrecoverable method-level errors.
///
/// None of these produce protocol traffic; the session is dead and the
/// caller tears it down. Conditions the protocol can answer (malformed
/// attributes, MAC mismatches) become Client-Error responses instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MethodError {
    #[error("received EAP-Success without a successful challenge round")]
    PrematureSuccess,

    #[error("received a non-failure message while expecting EAP-Failure")]
    ExpectingFailure,

    #[error("EAP method type mismatch: expected {expected}, got {actual}")]
    MethodTypeMismatch { expected: u8, actual: u8 },

    #[error("message processed after the session reached its final state")]
    SessionTerminated,

    #[error("received more than one notification in a single session")]
    DuplicateNotification,

    #[error("subscriber identity unavailable for subscription {0}")]
    IdentityUnavailable(u32),

    #[error("invalid authentication response from UICC: {0}")]
    InvalidUiccResponse(String),

    #[error(transparent)]
    Uicc(#[from] UiccError),

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("internal contract violation: {0}")]
    Internal(&'static str),
}

/// One dispatch step of a state machine
pub(crate) enum Step {
    /// Final answer for this inbound message
    Done(EapResult),
    /// State transition performed; re-dispatch the same message
    Redispatch,
}

/// Method-specific context for notification handling
pub(crate) struct NotificationContext {
    /// Processing inside the re-authentication state
    pub reauth_state: bool,
    /// A challenge or re-authentication round has already succeeded
    pub had_success: bool,
    /// Current re-authentication counter (0 outside reauth)
    pub counter: u16,
}

/// Session-wide fields shared by every state of a method machine.
pub(crate) struct SessionCore {
    /// Identity from the outer EAP-Identity exchange
    pub eap_identity: Vec<u8>,
    /// Method type tag this session speaks (18, 23 or 50)
    pub method_type: u8,
    pub codec: Arc<dyn AttributeCodec>,
    pub uicc: Arc<dyn UiccBackend>,
    pub identities: Arc<dyn IdentitySource>,
    pub rng: Box<dyn RngCore + Send>,
    /// Master key from the last full authentication or loaded reauth entry
    pub mk: Option<MasterKey>,
    /// Derived key bundle; present once a challenge round has derived keys
    pub keys: Option<SessionKeys>,
    /// At most one SIM/AKA notification is permitted per session
    pub notification_seen: bool,
    /// Set after an Authentication-Reject; only EAP-Failure or a
    /// notification is acceptable next
    pub expecting_failure: bool,
}

impl SessionCore {
    pub(crate) fn new(
        eap_identity: Vec<u8>,
        method_type: u8,
        codec: Arc<dyn AttributeCodec>,
        uicc: Arc<dyn UiccBackend>,
        identities: Arc<dyn IdentitySource>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        SessionCore {
            eap_identity,
            method_type,
            codec,
            uicc,
            identities,
            rng,
            mk: None,
            keys: None,
            notification_seen: false,
            expecting_failure: false,
        }
    }

    /// Fresh 16-byte random value (client nonce, AT_IV)
    pub(crate) fn random_bytes(&mut self) -> [u8; NONCE_LEN] {
        let mut bytes = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }

    /// Shared inbound interception and decoding.
    ///
    /// Handles, in order: premature EAP-Success, EAP-Failure (terminal),
    /// method-type mismatch, codec-level client errors, and the
    /// expecting-failure guard. States that can legitimately accept
    /// EAP-Success return their success before calling this.
    pub(crate) fn pre_decode(
        &mut self,
        tag: &str,
        message: &EapMessage,
    ) -> Result<TypeData, EapResult> {
        match message.code {
            EapCode::Success => {
                error!(state = tag, "unexpected EAP-Success");
                return Err(EapResult::Error(MethodError::PrematureSuccess));
            }
            EapCode::Failure => {
                debug!(state = tag, "EAP-Failure received, session terminal");
                return Err(EapResult::Failure);
            }
            EapCode::Request | EapCode::Response => {}
        }

        match message.method_type {
            Some(actual) if actual == self.method_type => {}
            actual => {
                error!(
                    state = tag,
                    expected = method_type_name(self.method_type),
                    "method type mismatch"
                );
                return Err(EapResult::Error(MethodError::MethodTypeMismatch {
                    expected: self.method_type,
                    actual: actual.unwrap_or(0),
                }));
            }
        }

        let type_data = match self.codec.decode(&message.type_data) {
            DecodeResult::TypeData(type_data) => type_data,
            DecodeResult::ClientError(code) => {
                warn!(state = tag, ?code, "undecodable type data");
                return Err(self.build_client_error(message.identifier, code));
            }
        };

        if self.expecting_failure && type_data.subtype != Subtype::Notification {
            error!(state = tag, "expected EAP-Failure after authentication reject");
            return Err(EapResult::Error(MethodError::ExpectingFailure));
        }

        Ok(type_data)
    }

    /// Encode a plain (unauthenticated) response
    pub(crate) fn build_response(
        &self,
        identifier: u8,
        subtype: Subtype,
        attributes: Vec<Attribute>,
    ) -> EapResult {
        EapResult::Response(self.codec.encode_packet(
            EapCode::Response,
            identifier,
            self.method_type,
            subtype,
            &attributes,
        ))
    }

    /// Encode a Client-Error response for a protocol-answerable fault
    pub(crate) fn build_client_error(&self, identifier: u8, code: ClientErrorCode) -> EapResult {
        self.build_response(
            identifier,
            Subtype::ClientError,
            vec![Attribute::ClientError(code)],
        )
    }

    /// Encode a response and protect it with AT_MAC.
    ///
    /// The MAC is computed over the packet image with a zeroed AT_MAC plus
    /// the subtype-specific seed, then written into the final encoding.
    pub(crate) fn build_response_with_mac(
        &self,
        identifier: u8,
        subtype: Subtype,
        seed: &[u8],
        mut attributes: Vec<Attribute>,
    ) -> Result<EapResult, MethodError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or(MethodError::Internal("MAC requested before key derivation"))?;

        attributes.push(Attribute::Mac([0u8; 16]));
        let image = self.codec.encode_packet(
            EapCode::Response,
            identifier,
            self.method_type,
            subtype,
            &attributes,
        );
        let mac = compute_mac(&keys.k_aut, &image, seed);

        let last = attributes
            .last_mut()
            .expect("MAC attribute was just pushed");
        *last = Attribute::Mac(mac);

        Ok(self.build_response(identifier, subtype, attributes))
    }

    /// Verify the AT_MAC of an inbound message.
    ///
    /// The received packet is re-encoded with the AT_MAC value zeroed and
    /// the digest compared in constant time. Absence of AT_MAC and a
    /// mismatch are both reported as an invalid MAC.
    pub(crate) fn validate_mac(
        &self,
        tag: &str,
        message: &EapMessage,
        type_data: &TypeData,
        seed: &[u8],
    ) -> Result<bool, MethodError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or(MethodError::Internal("MAC validation before key derivation"))?;

        let Some(Attribute::Mac(received)) = type_data.find(AttributeKind::Mac) else {
            warn!(state = tag, "AT_MAC missing from authenticated message");
            return Ok(false);
        };
        let received = *received;

        let zeroed: Vec<Attribute> = type_data
            .attributes
            .iter()
            .map(|attribute| match attribute {
                Attribute::Mac(_) => Attribute::Mac([0u8; 16]),
                other => other.clone(),
            })
            .collect();
        let image = self.codec.encode_packet(
            message.code,
            message.identifier,
            self.method_type,
            type_data.subtype,
            &zeroed,
        );

        let valid = verify_mac(&keys.k_aut, &image, seed, &received);
        if !valid {
            warn!(state = tag, "AT_MAC verification failed");
        }
        Ok(valid)
    }

    /// Decrypt and decode the secured attributes of a message carrying
    /// AT_IV + AT_ENCR_DATA. Returns None (with a warning) on any failure;
    /// callers decide whether the attributes were required.
    pub(crate) fn decrypt_secured_attributes(
        &self,
        tag: &str,
        type_data: &TypeData,
    ) -> Option<Vec<Attribute>> {
        let keys = self.keys.as_ref()?;

        let Some(Attribute::Iv(iv)) = type_data.find(AttributeKind::Iv) else {
            return None;
        };
        let Some(Attribute::EncrData(ciphertext)) = type_data.find(AttributeKind::EncrData)
        else {
            return None;
        };

        let plaintext = match decrypt_encr_data(&keys.k_encr, iv, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(state = tag, %err, "failed to decrypt AT_ENCR_DATA");
                return None;
            }
        };

        match self.codec.decode_attributes(&plaintext) {
            Ok(attributes) => Some(attributes),
            Err(err) => {
                warn!(state = tag, %err, "failed to decode secured attributes");
                None
            }
        }
    }

    /// Extract AT_NEXT_REAUTH_ID from the secured attributes, if offered
    pub(crate) fn next_reauth_id_from(&self, tag: &str, type_data: &TypeData) -> Option<Vec<u8>> {
        self.decrypt_secured_attributes(tag, type_data)?
            .into_iter()
            .find_map(|attribute| match attribute {
                Attribute::NextReauthId(id) => Some(id),
                _ => None,
            })
    }

    /// Build AT_IV + AT_ENCR_DATA wrapping a counter (and the
    /// counter-too-small marker when replay was detected).
    pub(crate) fn build_secured_counter_attrs(
        &mut self,
        counter: u16,
        counter_too_small: bool,
    ) -> Result<Vec<Attribute>, MethodError> {
        let k_encr: [u8; K_ENCR_LEN] = self
            .keys
            .as_ref()
            .ok_or(MethodError::Internal("AT_ENCR_DATA requested before key derivation"))?
            .k_encr;

        let mut inner = vec![Attribute::Counter(counter)];
        if counter_too_small {
            inner.push(Attribute::CounterTooSmall);
        }
        let plaintext = self.codec.encode_attributes(&inner);

        let iv: [u8; IV_LEN] = self.random_bytes();
        let ciphertext = encrypt_encr_data(&k_encr, &iv, &plaintext)
            .map_err(|err| MethodError::Crypto(err.to_string()))?;

        Ok(vec![Attribute::Iv(iv), Attribute::EncrData(ciphertext)])
    }

    /// Process a SIM/AKA-Notification subtype (RFC 4186#6.5, RFC 4187#6.4).
    ///
    /// The P bit of the status code selects the response shape:
    /// - P=1 (pre-challenge phase): plain empty Notification response
    /// - P=0 after a successful round: MAC-validated request, MAC-protected
    ///   response (with a secured counter when re-authenticating)
    /// - P=0 before any successful round: protocol misuse, Client-Error
    pub(crate) fn handle_notification(
        &mut self,
        tag: &str,
        ctx: NotificationContext,
        message: &EapMessage,
        type_data: &TypeData,
    ) -> EapResult {
        if self.notification_seen {
            error!(state = tag, "second notification in one session");
            return EapResult::Error(MethodError::DuplicateNotification);
        }
        self.notification_seen = true;

        let Some(Attribute::Notification(code)) = type_data.find(AttributeKind::Notification)
        else {
            warn!(state = tag, "notification without AT_NOTIFICATION");
            return self.build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };
        let code = *code;

        if code.is_success() {
            info!(state = tag, code = code.0, "success notification");
        } else {
            warn!(state = tag, code = code.0, "failure notification");
        }

        if code.is_pre_challenge() {
            return self.build_response(message.identifier, Subtype::Notification, Vec::new());
        }

        if !ctx.had_success {
            warn!(state = tag, "post-challenge notification before authentication");
            return self.build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        }

        match self.validate_mac(tag, message, type_data, &[]) {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess)
            }
            Err(err) => return EapResult::Error(err),
        }

        let attributes = if ctx.reauth_state {
            match self.build_secured_counter_attrs(ctx.counter, false) {
                Ok(attributes) => attributes,
                Err(err) => return EapResult::Error(err),
            }
        } else {
            Vec::new()
        };

        match self.build_response_with_mac(message.identifier, Subtype::Notification, &[], attributes)
        {
            Ok(result) => result,
            Err(err) => EapResult::Error(err),
        }
    }
}
