//! EAP-AKA Method State Machine (RFC 4187)
//!
//! Valid paths for an EAP-AKA session:
//!
//! ```text
//! Created --+--> Identity ->+--+>----> Challenge ------>+-> Final
//!           |               ^  v           ^            ^
//!           |               |  |           |            |
//!           +---------------+  +--> Re-authentication --+
//! ```
//!
//! A challenge whose AUTN carries an out-of-sync sequence number is
//! answered with AKA-Synchronization-Failure and the session stays ready
//! for a fresh challenge. When EAP-AKA' is available locally, an AT_BIDDING
//! attribute claiming AKA' support is a bidding-down signal and aborts the
//! exchange with AKA-Authentication-Reject (RFC 5448#4).
//!
//! The EAP-AKA' variant plugs in through [`AkaVariant`]: it changes the
//! method type tag and the permanent-identity prefix, injected at session
//! construction.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, error, info, warn};

use simaka_proto::attributes::{Attribute, AttributeKind, ClientErrorCode};
use simaka_proto::codec::{AttributeCodec, Subtype, TypeData};
use simaka_proto::keys::{
    derive_mk_aka, derive_reauth_session_keys, derive_session_keys, MasterKey, SessionKeys,
    EMSK_LEN, MSK_LEN,
};
use simaka_proto::message::{EapCode, EapMessage, EAP_TYPE_AKA, EAP_TYPE_AKA_PRIME};

use crate::backend::{
    format_aka_challenge, parse_aka_response, AkaChallengeResult, IdentitySource, ResponseError,
    UiccAppType, UiccBackend, UiccError,
};
use crate::config::EapAkaConfig;
use crate::machine::{MethodError, NotificationContext, SessionCore, Step};
use crate::reauth::{ReauthInfo, ReauthStore};
use crate::result::{EapResult, EapSuccess};

/// Which AKA flavour this session speaks.
///
/// The AKA' specialisation is a strategy value rather than a subtype of
/// the machine: it selects the method type tag and identity prefix and
/// leaves the transition logic untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkaVariant {
    Aka,
    AkaPrime,
}

impl AkaVariant {
    /// The EAP method type tag for this variant
    pub fn method_type(self) -> u8 {
        match self {
            AkaVariant::Aka => EAP_TYPE_AKA,
            AkaVariant::AkaPrime => EAP_TYPE_AKA_PRIME,
        }
    }

    /// Permanent identity prefix (RFC 4187#4.1.1.6, RFC 5448#3)
    pub fn identity_prefix(self) -> &'static str {
        match self {
            AkaVariant::Aka => "0",
            AkaVariant::AkaPrime => "6",
        }
    }
}

/// State payload while identity negotiation is open
struct IdentityData {
    identity: Option<Vec<u8>>,
    reauth_id: Option<Vec<u8>>,
    reauth_info: Option<ReauthInfo>,
}

/// State payload for the full-authentication challenge round
struct ChallengeData {
    identity: Vec<u8>,
    had_successful_challenge: bool,
    next_reauth_id: Option<Vec<u8>>,
}

/// State payload for the fast re-authentication round
struct ReauthData {
    reauth_id: Option<Vec<u8>>,
    reauth_info: Option<ReauthInfo>,
    had_successful_reauth: bool,
    next_reauth_id: Option<Vec<u8>>,
    counter: u16,
}

enum AkaState {
    Created,
    Identity(IdentityData),
    Challenge(ChallengeData),
    Reauth(ReauthData),
    Final,
}

impl AkaState {
    fn name(&self) -> &'static str {
        match self {
            AkaState::Created => "Created",
            AkaState::Identity(_) => "Identity",
            AkaState::Challenge(_) => "Challenge",
            AkaState::Reauth(_) => "Reauthentication",
            AkaState::Final => "Final",
        }
    }
}

/// One EAP-AKA (or EAP-AKA') authentication session.
pub struct EapAkaSession {
    core: SessionCore,
    config: EapAkaConfig,
    variant: AkaVariant,
    supports_aka_prime: bool,
    store: Arc<dyn ReauthStore>,
    state: AkaState,
}

impl EapAkaSession {
    /// Create a plain EAP-AKA session with an OS-seeded RNG.
    pub fn new(
        eap_identity: Vec<u8>,
        config: EapAkaConfig,
        codec: Arc<dyn AttributeCodec>,
        uicc: Arc<dyn UiccBackend>,
        identities: Arc<dyn IdentitySource>,
        store: Arc<dyn ReauthStore>,
    ) -> Self {
        Self::with_options(
            AkaVariant::Aka,
            false,
            eap_identity,
            config,
            codec,
            uicc,
            identities,
            store,
            Box::new(StdRng::from_os_rng()),
        )
    }

    /// Full constructor: variant selection, bidding-down sensitivity, and a
    /// caller-supplied RNG.
    #[allow(clippy::too_many_arguments)]
    pub fn with_options(
        variant: AkaVariant,
        supports_aka_prime: bool,
        eap_identity: Vec<u8>,
        config: EapAkaConfig,
        codec: Arc<dyn AttributeCodec>,
        uicc: Arc<dyn UiccBackend>,
        identities: Arc<dyn IdentitySource>,
        store: Arc<dyn ReauthStore>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        EapAkaSession {
            core: SessionCore::new(
                eap_identity,
                variant.method_type(),
                codec,
                uicc,
                identities,
                rng,
            ),
            config,
            variant,
            supports_aka_prime,
            store,
            state: AkaState::Created,
        }
    }

    /// Process one inbound EAP message to completion.
    ///
    /// Internal transitions re-dispatch the same message until a state
    /// produces a result. Success and failure are terminal; any message
    /// processed afterwards is a contract violation.
    pub fn process(&mut self, message: &EapMessage) -> EapResult {
        let result = loop {
            match self.step(message) {
                Step::Done(result) => break result,
                Step::Redispatch => {
                    debug!(state = self.state.name(), "re-dispatching message");
                }
            }
        };

        if matches!(result, EapResult::Success(_) | EapResult::Failure) {
            self.state = AkaState::Final;
        }
        result
    }

    fn step(&mut self, message: &EapMessage) -> Step {
        let state = std::mem::replace(&mut self.state, AkaState::Final);
        match state {
            AkaState::Created => self.step_created(message),
            AkaState::Identity(data) => self.step_identity(message, data),
            AkaState::Challenge(data) => self.step_challenge(message, data),
            AkaState::Reauth(data) => self.step_reauth(message, data),
            AkaState::Final => {
                error!("message processed after final state");
                Step::Done(EapResult::Error(MethodError::SessionTerminated))
            }
        }
    }

    /// Look up (and atomically consume) the stored reauth entry for the
    /// identity provisioned in the session configuration.
    fn available_reauth(&self) -> (Option<Vec<u8>>, Option<ReauthInfo>) {
        let Some(reauth_id) = self.config.reauth_id.clone() else {
            return (None, None);
        };
        let info = self
            .store
            .get_and_invalidate(&reauth_id, &self.core.eap_identity);
        (Some(reauth_id), info)
    }

    fn step_created(&mut self, message: &EapMessage) -> Step {
        self.state = AkaState::Created;

        let type_data = match self.core.pre_decode("Created", message) {
            Ok(type_data) => type_data,
            Err(result) => return Step::Done(result),
        };

        match type_data.subtype {
            Subtype::AkaIdentity => {
                let (reauth_id, reauth_info) = self.available_reauth();
                self.state = AkaState::Identity(IdentityData {
                    identity: None,
                    reauth_id,
                    reauth_info,
                });
                Step::Redispatch
            }
            Subtype::AkaChallenge => {
                // server skipped identity negotiation (RFC 4187#7)
                self.state = AkaState::Challenge(ChallengeData {
                    identity: self.core.eap_identity.clone(),
                    had_successful_challenge: false,
                    next_reauth_id: None,
                });
                Step::Redispatch
            }
            Subtype::Reauthentication => {
                let (reauth_id, reauth_info) = self.available_reauth();
                self.state = AkaState::Reauth(ReauthData {
                    reauth_id,
                    reauth_info,
                    had_successful_reauth: false,
                    next_reauth_id: None,
                    counter: 0,
                });
                Step::Redispatch
            }
            Subtype::Notification => Step::Done(self.core.handle_notification(
                "Created",
                NotificationContext {
                    reauth_state: false,
                    had_success: false,
                    counter: 0,
                },
                message,
                &type_data,
            )),
            _ => Step::Done(
                self.core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
            ),
        }
    }

    fn step_identity(&mut self, message: &EapMessage, mut data: IdentityData) -> Step {
        let type_data = match self.core.pre_decode("Identity", message) {
            Ok(type_data) => type_data,
            Err(result) => {
                self.state = AkaState::Identity(data);
                return Step::Done(result);
            }
        };

        match type_data.subtype {
            Subtype::AkaIdentity => {}
            Subtype::AkaChallenge => {
                self.state = AkaState::Challenge(ChallengeData {
                    identity: data
                        .identity
                        .unwrap_or_else(|| self.core.eap_identity.clone()),
                    had_successful_challenge: false,
                    next_reauth_id: None,
                });
                return Step::Redispatch;
            }
            Subtype::Reauthentication => {
                self.state = AkaState::Reauth(ReauthData {
                    reauth_id: data.reauth_id,
                    reauth_info: data.reauth_info,
                    had_successful_reauth: false,
                    next_reauth_id: None,
                    counter: 0,
                });
                return Step::Redispatch;
            }
            Subtype::Notification => {
                let result = self.core.handle_notification(
                    "Identity",
                    NotificationContext {
                        reauth_state: false,
                        had_success: false,
                        counter: 0,
                    },
                    message,
                    &type_data,
                );
                self.state = AkaState::Identity(data);
                return Step::Done(result);
            }
            _ => {
                self.state = AkaState::Identity(data);
                return Step::Done(
                    self.core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
                );
            }
        }

        if !is_valid_identity_attributes(&type_data) {
            warn!(state = "Identity", "invalid attributes in AKA-Identity request");
            self.state = AkaState::Identity(data);
            return Step::Done(
                self.core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
            );
        }

        let identity_to_respond = match data.reauth_id.clone() {
            Some(reauth_id)
                if type_data.contains(AttributeKind::AnyIdReq) && data.reauth_info.is_some() =>
            {
                debug!(state = "Identity", "responding with reauth identity");
                reauth_id
            }
            _ => {
                let Some(imsi) = self.core.identities.subscriber_identity(self.config.sub_id)
                else {
                    error!(sub_id = self.config.sub_id, "IMSI unavailable");
                    self.state = AkaState::Identity(data);
                    return Step::Done(EapResult::Error(MethodError::IdentityUnavailable(
                        self.config.sub_id,
                    )));
                };
                let identity = format!("{}{imsi}", self.variant.identity_prefix()).into_bytes();
                debug!(state = "Identity", "responding with permanent identity");
                data.identity = Some(identity.clone());
                identity
            }
        };

        let result = self.core.build_response(
            message.identifier,
            Subtype::AkaIdentity,
            vec![Attribute::Identity(identity_to_respond)],
        );
        self.state = AkaState::Identity(data);
        Step::Done(result)
    }

    fn step_challenge(&mut self, message: &EapMessage, mut data: ChallengeData) -> Step {
        if message.code == EapCode::Success && data.had_successful_challenge {
            self.state = AkaState::Final;
            // a freshly offered reauth identity starts its counter at zero
            let next_reauth_id = data.next_reauth_id.take();
            return Step::Done(self.eap_success(next_reauth_id, 0));
        }

        let type_data = match self.core.pre_decode("Challenge", message) {
            Ok(type_data) => type_data,
            Err(result) => {
                self.state = AkaState::Challenge(data);
                return Step::Done(result);
            }
        };

        match type_data.subtype {
            Subtype::AkaChallenge => {}
            Subtype::Notification => {
                let result = self.core.handle_notification(
                    "Challenge",
                    NotificationContext {
                        reauth_state: false,
                        had_success: data.had_successful_challenge,
                        counter: 0,
                    },
                    message,
                    &type_data,
                );
                self.state = AkaState::Challenge(data);
                return Step::Done(result);
            }
            _ => {
                self.state = AkaState::Challenge(data);
                return Step::Done(
                    self.core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
                );
            }
        }

        let result = self.handle_challenge(message, &type_data, &mut data);
        self.state = AkaState::Challenge(data);
        Step::Done(result)
    }

    fn handle_challenge(
        &mut self,
        message: &EapMessage,
        type_data: &TypeData,
        data: &mut ChallengeData,
    ) -> EapResult {
        if !is_valid_challenge_attributes(type_data) {
            warn!(state = "Challenge", "invalid attributes in AKA-Challenge");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        }

        let (Some(Attribute::RandAka(rand)), Some(Attribute::Autn(autn))) = (
            type_data.find(AttributeKind::Rand),
            type_data.find(AttributeKind::Autn),
        ) else {
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };

        let response = match self
            .core
            .uicc
            .authenticate(UiccAppType::EapAka, &format_aka_challenge(rand, autn))
        {
            Ok(response) => response,
            Err(UiccError::AuthenticationRejected) => {
                // AUTN rejected by the card (RFC 4187#6.3.1)
                warn!(state = "Challenge", "AUTN rejected, sending Authentication-Reject");
                return self.build_authentication_reject(message.identifier);
            }
            Err(err) => {
                error!(state = "Challenge", %err, "UICC authentication failed");
                return EapResult::Error(MethodError::Uicc(err));
            }
        };

        let challenge_result = match parse_aka_response(&response) {
            Ok(result) => result,
            Err(err @ ResponseError::InvalidTag(_)) => {
                error!(state = "Challenge", %err, "unusable UICC response");
                return EapResult::Error(MethodError::InvalidUiccResponse(err.to_string()));
            }
            Err(err) => {
                warn!(state = "Challenge", %err, "invalid response returned from UICC");
                return self
                    .core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
            }
        };

        let (res, ik, ck) = match challenge_result {
            AkaChallengeResult::SynchronizationFailure { auts } => {
                // answer with AUTS and stay ready for a fresh challenge;
                // no keys are derived (RFC 4187#6.3.1)
                info!(state = "Challenge", "synchronization failure");
                return self.core.build_response(
                    message.identifier,
                    Subtype::AkaSynchronizationFailure,
                    vec![Attribute::Auts(auts)],
                );
            }
            AkaChallengeResult::Success { res, ik, ck } => (res, ik, ck),
        };

        let mk = derive_mk_aka(&data.identity, &ik, &ck);
        self.core.keys = Some(derive_session_keys(&mk));
        self.core.mk = Some(mk);

        match self.core.validate_mac("Challenge", message, type_data, &[]) {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess)
            }
            Err(err) => return EapResult::Error(err),
        }

        // before committing to a response, check for bidding-down (RFC 5448#4)
        if self.bidding_down_detected(type_data) {
            return self.build_authentication_reject(message.identifier);
        }

        data.next_reauth_id = self.core.next_reauth_id_from("Challenge", type_data);

        let res_attribute = match Attribute::res(res) {
            Ok(attribute) => attribute,
            Err(err) => return EapResult::Error(MethodError::Attribute(err)),
        };

        // server has been authenticated, so we can send a response
        data.had_successful_challenge = true;
        match self.core.build_response_with_mac(
            message.identifier,
            Subtype::AkaChallenge,
            &[],
            vec![res_attribute],
        ) {
            Ok(result) => result,
            Err(err) => EapResult::Error(err),
        }
    }

    fn step_reauth(&mut self, message: &EapMessage, mut data: ReauthData) -> Step {
        if message.code == EapCode::Success && data.had_successful_reauth {
            self.state = AkaState::Final;
            let next_reauth_id = data.next_reauth_id.take();
            let counter = data.counter;
            return Step::Done(self.eap_success(next_reauth_id, counter));
        }

        let type_data = match self.core.pre_decode("Reauthentication", message) {
            Ok(type_data) => type_data,
            Err(result) => {
                self.state = AkaState::Reauth(data);
                return Step::Done(result);
            }
        };

        match type_data.subtype {
            Subtype::Reauthentication => {}
            Subtype::AkaChallenge => {
                // server fell back to full authentication
                self.state = AkaState::Challenge(ChallengeData {
                    identity: self.core.eap_identity.clone(),
                    had_successful_challenge: false,
                    next_reauth_id: None,
                });
                return Step::Redispatch;
            }
            Subtype::Notification => {
                let result = self.core.handle_notification(
                    "Reauthentication",
                    NotificationContext {
                        reauth_state: true,
                        had_success: data.had_successful_reauth,
                        counter: data.counter,
                    },
                    message,
                    &type_data,
                );
                self.state = AkaState::Reauth(data);
                return Step::Done(result);
            }
            _ => {
                self.state = AkaState::Reauth(data);
                return Step::Done(
                    self.core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
                );
            }
        }

        let result = self.handle_reauthentication(message, &type_data, &mut data);
        self.state = AkaState::Reauth(data);
        Step::Done(result)
    }

    fn handle_reauthentication(
        &mut self,
        message: &EapMessage,
        type_data: &TypeData,
        data: &mut ReauthData,
    ) -> EapResult {
        if !is_valid_reauth_attributes(type_data) {
            warn!(state = "Reauthentication", "invalid attributes in Re-authentication");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        }

        let (Some(reauth_id), Some(reauth_info)) = (&data.reauth_id, &data.reauth_info) else {
            warn!(state = "Reauthentication", "no stored credentials for this identity");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };

        // keys come from the stored entry, not a fresh derivation
        self.core.mk = Some(MasterKey(*reauth_info.mk()));
        self.core.keys = Some(SessionKeys {
            k_encr: *reauth_info.k_encr(),
            k_aut: *reauth_info.k_aut(),
            msk: [0u8; MSK_LEN],
            emsk: [0u8; EMSK_LEN],
        });

        match self
            .core
            .validate_mac("Reauthentication", message, type_data, &[])
        {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess)
            }
            Err(err) => return EapResult::Error(err),
        }

        let Some(secured) = self
            .core
            .decrypt_secured_attributes("Reauthentication", type_data)
        else {
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };

        let counter = secured.iter().find_map(|attribute| match attribute {
            Attribute::Counter(counter) => Some(*counter),
            _ => None,
        });
        let nonce_s = secured.iter().find_map(|attribute| match attribute {
            Attribute::NonceS(nonce_s) => Some(*nonce_s),
            _ => None,
        });
        let (Some(counter), Some(nonce_s)) = (counter, nonce_s) else {
            warn!(state = "Reauthentication", "secured COUNTER or NONCE_S missing");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };

        data.next_reauth_id = secured.into_iter().find_map(|attribute| match attribute {
            Attribute::NextReauthId(id) => Some(id),
            _ => None,
        });

        if counter <= reauth_info.counter() {
            // replayed counter: answer with AT_COUNTER_TOO_SMALL, keep all
            // session state unchanged so the server can fall back
            warn!(
                state = "Reauthentication",
                offered = counter,
                stored = reauth_info.counter(),
                "counter too small"
            );
            let attributes = match self.core.build_secured_counter_attrs(counter, true) {
                Ok(attributes) => attributes,
                Err(err) => return EapResult::Error(err),
            };
            return match self.core.build_response_with_mac(
                message.identifier,
                Subtype::Reauthentication,
                &nonce_s,
                attributes,
            ) {
                Ok(result) => result,
                Err(err) => EapResult::Error(err),
            };
        }
        data.counter = counter;

        let mk = MasterKey(*reauth_info.mk());
        self.core.keys = Some(derive_reauth_session_keys(
            reauth_id,
            counter,
            &nonce_s,
            &mk,
            reauth_info.k_encr(),
            reauth_info.k_aut(),
        ));

        if self.bidding_down_detected(type_data) {
            return self.build_authentication_reject(message.identifier);
        }

        data.had_successful_reauth = true;
        let attributes = match self.core.build_secured_counter_attrs(counter, false) {
            Ok(attributes) => attributes,
            Err(err) => return EapResult::Error(err),
        };
        match self.core.build_response_with_mac(
            message.identifier,
            Subtype::Reauthentication,
            &nonce_s,
            attributes,
        ) {
            Ok(result) => result,
            Err(err) => EapResult::Error(err),
        }
    }

    /// AT_BIDDING advertising AKA' while AKA' is available locally means a
    /// stronger method was stripped in transit (RFC 5448#4).
    fn bidding_down_detected(&self, type_data: &TypeData) -> bool {
        if !self.supports_aka_prime {
            return false;
        }
        match type_data.find(AttributeKind::Bidding) {
            Some(Attribute::Bidding {
                server_supports_aka_prime: true,
            }) => {
                warn!("potential bidding-down attack: AT_BIDDING present and EAP-AKA' supported");
                true
            }
            _ => false,
        }
    }

    fn build_authentication_reject(&mut self, identifier: u8) -> EapResult {
        self.core.expecting_failure = true;
        self.core
            .build_response(identifier, Subtype::AkaAuthenticationReject, Vec::new())
    }

    /// Release MSK/EMSK and register a freshly offered reauth identity.
    fn eap_success(&mut self, next_reauth_id: Option<Vec<u8>>, counter: u16) -> EapResult {
        let Some(keys) = self.core.keys.as_ref() else {
            return EapResult::Error(MethodError::Internal("success without derived keys"));
        };

        if let (Some(reauth_id), Some(mk)) = (&next_reauth_id, self.core.mk.as_ref()) {
            self.store.register(
                reauth_id,
                &self.core.eap_identity,
                counter,
                &mk.0,
                &keys.k_encr,
                &keys.k_aut,
            );
        }

        EapResult::Success(EapSuccess {
            msk: keys.msk.to_vec(),
            emsk: keys.emsk.to_vec(),
            next_reauth_id,
        })
    }
}

/// AKA-Identity must carry exactly one identity request and none of the
/// authenticated/encrypted attributes.
fn is_valid_identity_attributes(type_data: &TypeData) -> bool {
    let id_requests = type_data.count_present(&[
        AttributeKind::PermanentIdReq,
        AttributeKind::AnyIdReq,
        AttributeKind::FullauthIdReq,
    ]);
    if id_requests != 1 {
        return false;
    }

    !type_data.contains(AttributeKind::Mac)
        && !type_data.contains(AttributeKind::Iv)
        && !type_data.contains(AttributeKind::EncrData)
}

/// AKA-Challenge must carry AT_RAND, AT_AUTN and AT_MAC.
fn is_valid_challenge_attributes(type_data: &TypeData) -> bool {
    type_data.contains(AttributeKind::Rand)
        && type_data.contains(AttributeKind::Autn)
        && type_data.contains(AttributeKind::Mac)
}

/// Re-authentication must carry AT_IV, AT_ENCR_DATA and AT_MAC.
fn is_valid_reauth_attributes(type_data: &TypeData) -> bool {
    type_data.contains(AttributeKind::Iv)
        && type_data.contains(AttributeKind::EncrData)
        && type_data.contains(AttributeKind::Mac)
}
