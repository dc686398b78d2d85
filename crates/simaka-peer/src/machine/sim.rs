//! EAP-SIM Method State Machine (RFC 4186)
//!
//! Valid paths for an EAP-SIM session:
//!
//! ```text
//! Created ---> Start ---> Challenge ---> Final
//! ```
//!
//! The Start round negotiates the protocol version and optionally the
//! identity; the Challenge round runs the GSM algorithm over 2..3 RAND
//! values, derives the key bundle, and authenticates the server through
//! AT_MAC. A terminal EAP-Success releases MSK/EMSK to the caller.
//!
//! Notification messages can arrive in any state; at most one is allowed
//! per session.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, error, warn};

use simaka_proto::attributes::{Attribute, AttributeKind, ClientErrorCode, NONCE_LEN};
use simaka_proto::codec::{AttributeCodec, Subtype, TypeData};
use simaka_proto::keys::{derive_mk_sim, derive_session_keys, KC_LEN};
use simaka_proto::message::{EapCode, EapMessage, EAP_TYPE_SIM};

use crate::backend::{
    format_sim_challenge, parse_sim_response, IdentitySource, UiccAppType, UiccBackend,
};
use crate::config::EapSimConfig;
use crate::machine::{MethodError, NotificationContext, SessionCore, Step};
use crate::result::{EapResult, EapSuccess};

// EAP-SIM identity prefix (RFC 4186#4.1.2.6)
const SIM_IDENTITY_PREFIX: &str = "1";

// The only protocol version defined by RFC 4186
const SUPPORTED_VERSION: u16 = 1;

// RFC 4186#9.3: a challenge carries two or three RANDs
const MIN_RAND_COUNT: usize = 2;
const MAX_RAND_COUNT: usize = 3;

/// State payload once a Start request has been seen
struct StartData {
    nonce_mt: [u8; NONCE_LEN],
    identity: Option<Vec<u8>>,
    version_list: Vec<u16>,
    selected_version: u16,
}

/// State payload for the challenge round
struct ChallengeData {
    nonce_mt: [u8; NONCE_LEN],
    identity: Vec<u8>,
    version_list: Vec<u16>,
    selected_version: u16,
    had_successful_challenge: bool,
}

enum SimState {
    Created,
    Start(StartData),
    Challenge(ChallengeData),
    Final,
}

impl SimState {
    fn name(&self) -> &'static str {
        match self {
            SimState::Created => "Created",
            SimState::Start(_) => "Start",
            SimState::Challenge(_) => "Challenge",
            SimState::Final => "Final",
        }
    }
}

/// One EAP-SIM authentication session.
pub struct EapSimSession {
    core: SessionCore,
    config: EapSimConfig,
    state: SimState,
}

impl EapSimSession {
    /// Create a session with an OS-seeded RNG.
    pub fn new(
        eap_identity: Vec<u8>,
        config: EapSimConfig,
        codec: Arc<dyn AttributeCodec>,
        uicc: Arc<dyn UiccBackend>,
        identities: Arc<dyn IdentitySource>,
    ) -> Self {
        Self::with_rng(
            eap_identity,
            config,
            codec,
            uicc,
            identities,
            Box::new(StdRng::from_os_rng()),
        )
    }

    /// Create a session with a caller-supplied RNG (deterministic tests).
    pub fn with_rng(
        eap_identity: Vec<u8>,
        config: EapSimConfig,
        codec: Arc<dyn AttributeCodec>,
        uicc: Arc<dyn UiccBackend>,
        identities: Arc<dyn IdentitySource>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        EapSimSession {
            core: SessionCore::new(eap_identity, EAP_TYPE_SIM, codec, uicc, identities, rng),
            config,
            state: SimState::Created,
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
            self.state = SimState::Final;
        }
        result
    }

    fn step(&mut self, message: &EapMessage) -> Step {
        let state = std::mem::replace(&mut self.state, SimState::Final);
        match state {
            SimState::Created => self.step_created(message),
            SimState::Start(data) => self.step_start(message, data),
            SimState::Challenge(data) => self.step_challenge(message, data),
            SimState::Final => {
                error!("message processed after final state");
                Step::Done(EapResult::Error(MethodError::SessionTerminated))
            }
        }
    }

    fn step_created(&mut self, message: &EapMessage) -> Step {
        self.state = SimState::Created;

        let type_data = match self.core.pre_decode("Created", message) {
            Ok(type_data) => type_data,
            Err(result) => return Step::Done(result),
        };

        match type_data.subtype {
            Subtype::SimStart => {
                let nonce_mt = self.core.random_bytes();
                self.state = SimState::Start(StartData {
                    nonce_mt,
                    identity: None,
                    version_list: Vec::new(),
                    selected_version: 0,
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

    fn step_start(&mut self, message: &EapMessage, mut data: StartData) -> Step {
        let type_data = match self.core.pre_decode("Start", message) {
            Ok(type_data) => type_data,
            Err(result) => {
                self.state = SimState::Start(data);
                return Step::Done(result);
            }
        };

        match type_data.subtype {
            Subtype::SimStart => {}
            Subtype::SimChallenge => {
                self.state = SimState::Challenge(ChallengeData {
                    nonce_mt: data.nonce_mt,
                    identity: data
                        .identity
                        .unwrap_or_else(|| self.core.eap_identity.clone()),
                    version_list: data.version_list,
                    selected_version: data.selected_version,
                    had_successful_challenge: false,
                });
                return Step::Redispatch;
            }
            Subtype::Notification => {
                let result = self.core.handle_notification(
                    "Start",
                    NotificationContext {
                        reauth_state: false,
                        had_success: false,
                        counter: 0,
                    },
                    message,
                    &type_data,
                );
                self.state = SimState::Start(data);
                return Step::Done(result);
            }
            _ => {
                self.state = SimState::Start(data);
                return Step::Done(
                    self.core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
                );
            }
        }

        if !is_valid_start_attributes(&type_data) {
            warn!(state = "Start", "invalid attributes in SIM-Start request");
            self.state = SimState::Start(data);
            return Step::Done(
                self.core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
            );
        }

        let Some(Attribute::VersionList(versions)) = type_data.find(AttributeKind::VersionList)
        else {
            self.state = SimState::Start(data);
            return Step::Done(
                self.core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
            );
        };

        if !versions.contains(&SUPPORTED_VERSION) {
            warn!(state = "Start", ?versions, "no supported protocol version offered");
            self.state = SimState::Start(data);
            return Step::Done(
                self.core
                    .build_client_error(message.identifier, ClientErrorCode::UnsupportedVersion),
            );
        }
        data.version_list = versions.clone();
        data.selected_version = SUPPORTED_VERSION;

        let identity_requested = type_data.count_present(&[
            AttributeKind::PermanentIdReq,
            AttributeKind::AnyIdReq,
            AttributeKind::FullauthIdReq,
        ]) == 1;

        let mut attributes = vec![
            Attribute::NonceMt(data.nonce_mt),
            Attribute::SelectedVersion(SUPPORTED_VERSION),
        ];

        if identity_requested {
            let Some(imsi) = self.core.identities.subscriber_identity(self.config.sub_id)
            else {
                error!(sub_id = self.config.sub_id, "IMSI unavailable");
                self.state = SimState::Start(data);
                return Step::Done(EapResult::Error(MethodError::IdentityUnavailable(
                    self.config.sub_id,
                )));
            };
            let identity = format!("{SIM_IDENTITY_PREFIX}{imsi}").into_bytes();
            debug!(state = "Start", "responding with permanent identity");
            data.identity = Some(identity.clone());
            attributes.push(Attribute::Identity(identity));
        }

        let result = self
            .core
            .build_response(message.identifier, Subtype::SimStart, attributes);
        self.state = SimState::Start(data);
        Step::Done(result)
    }

    fn step_challenge(&mut self, message: &EapMessage, mut data: ChallengeData) -> Step {
        if message.code == EapCode::Success && data.had_successful_challenge {
            self.state = SimState::Final;
            return Step::Done(self.eap_success());
        }

        let type_data = match self.core.pre_decode("Challenge", message) {
            Ok(type_data) => type_data,
            Err(result) => {
                self.state = SimState::Challenge(data);
                return Step::Done(result);
            }
        };

        match type_data.subtype {
            Subtype::SimChallenge => {}
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
                self.state = SimState::Challenge(data);
                return Step::Done(result);
            }
            _ => {
                self.state = SimState::Challenge(data);
                return Step::Done(
                    self.core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess),
                );
            }
        }

        let result = self.handle_challenge(message, &type_data, &mut data);
        self.state = SimState::Challenge(data);
        Step::Done(result)
    }

    fn handle_challenge(
        &mut self,
        message: &EapMessage,
        type_data: &TypeData,
        data: &mut ChallengeData,
    ) -> EapResult {
        if !type_data.contains(AttributeKind::Mac) {
            warn!(state = "Challenge", "AT_MAC missing from challenge");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        }

        let Some(Attribute::RandSim(rands)) = type_data.find(AttributeKind::Rand) else {
            warn!(state = "Challenge", "AT_RAND missing from challenge");
            return self
                .core
                .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
        };

        if rands.len() < MIN_RAND_COUNT || rands.len() > MAX_RAND_COUNT {
            warn!(state = "Challenge", count = rands.len(), "invalid RAND count");
            return self.core.build_client_error(
                message.identifier,
                ClientErrorCode::InsufficientChallenges,
            );
        }

        let mut kcs: Vec<[u8; KC_LEN]> = Vec::with_capacity(rands.len());
        let mut sres_concat = Vec::with_capacity(rands.len() * 4);
        for rand in rands {
            let response = match self
                .core
                .uicc
                .authenticate(UiccAppType::EapSim, &format_sim_challenge(rand))
            {
                Ok(response) => response,
                Err(err) => {
                    error!(state = "Challenge", %err, "UICC authentication failed");
                    return EapResult::Error(MethodError::Uicc(err));
                }
            };

            match parse_sim_response(&response) {
                Ok(result) => {
                    kcs.push(result.kc);
                    sres_concat.extend_from_slice(&result.sres);
                }
                Err(err) => {
                    warn!(state = "Challenge", %err, "invalid response returned from SIM");
                    return self
                        .core
                        .build_client_error(message.identifier, ClientErrorCode::UnableToProcess);
                }
            }
        }

        let mk = derive_mk_sim(
            &data.identity,
            &kcs,
            &data.nonce_mt,
            &data.version_list,
            data.selected_version,
        );
        self.core.keys = Some(derive_session_keys(&mk));
        self.core.mk = Some(mk);

        match self
            .core
            .validate_mac("Challenge", message, type_data, &data.nonce_mt)
        {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .core
                    .build_client_error(message.identifier, ClientErrorCode::UnableToProcess)
            }
            Err(err) => return EapResult::Error(err),
        }

        // server authenticated; the response MAC covers the joined SRES values
        data.had_successful_challenge = true;
        match self.core.build_response_with_mac(
            message.identifier,
            Subtype::SimChallenge,
            &sres_concat,
            Vec::new(),
        ) {
            Ok(result) => result,
            Err(err) => EapResult::Error(err),
        }
    }

    fn eap_success(&mut self) -> EapResult {
        let Some(keys) = self.core.keys.as_ref() else {
            return EapResult::Error(MethodError::Internal("success without derived keys"));
        };
        EapResult::Success(EapSuccess {
            msk: keys.msk.to_vec(),
            emsk: keys.emsk.to_vec(),
            next_reauth_id: None,
        })
    }
}

/// SIM-Start must carry a version list, at most one identity request, and
/// none of the authenticated/encrypted attributes.
fn is_valid_start_attributes(type_data: &TypeData) -> bool {
    if !type_data.contains(AttributeKind::VersionList) {
        return false;
    }

    let id_requests = type_data.count_present(&[
        AttributeKind::PermanentIdReq,
        AttributeKind::AnyIdReq,
        AttributeKind::FullauthIdReq,
    ]);
    if id_requests > 1 {
        return false;
    }

    !type_data.contains(AttributeKind::Mac)
        && !type_data.contains(AttributeKind::Iv)
        && !type_data.contains(AttributeKind::EncrData)
}
