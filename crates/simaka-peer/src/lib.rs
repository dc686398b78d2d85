//! EAP-SIM / EAP-AKA Peer Method Engine
//!
//! Peer-side (supplicant) state machines for the EAP-SIM (RFC 4186) and
//! EAP-AKA (RFC 4187) authentication methods, including fast
//! re-authentication and the RFC 5448 bidding-down guard for EAP-AKA'.
//!
//! Each authentication session owns exactly one state machine. An inbound
//! EAP message enters [`EapSimSession::process`] or
//! [`EapAkaSession::process`] and produces a tagged [`EapResult`]: an
//! outbound response, a terminal success carrying MSK/EMSK, a terminal
//! failure, or a fatal error.
//!
//! # Collaborators
//!
//! The engine talks to the outside world through traits:
//!
//! - [`simaka_proto::AttributeCodec`] - the TLV wire codec
//! - [`UiccBackend`] - the SIM/USIM card performing the GSM or UMTS
//!   authentication algorithm (may block; callers needing timeouts run the
//!   session on a worker)
//! - [`IdentitySource`] - IMSI lookup for a subscription
//! - [`ReauthStore`] - fast re-authentication identity storage with
//!   at-most-once consumption
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use simaka_peer::{EapAkaSession, EapAkaConfig, ReauthIdentityTracker};
//! # fn collaborators() -> (Arc<dyn simaka_proto::AttributeCodec>,
//! #     Arc<dyn simaka_peer::UiccBackend>, Arc<dyn simaka_peer::IdentitySource>) { unimplemented!() }
//!
//! let (codec, uicc, identities) = collaborators();
//! let store = Arc::new(ReauthIdentityTracker::new());
//! let mut session = EapAkaSession::new(
//!     b"0555444333222111".to_vec(),
//!     EapAkaConfig { sub_id: 1, reauth_id: None },
//!     codec,
//!     uicc,
//!     identities,
//!     store,
//! );
//! // feed inbound EAP messages into session.process(..)
//! ```

pub mod backend;
pub mod config;
pub mod machine;
pub mod reauth;
pub mod result;

pub use backend::{IdentitySource, UiccAppType, UiccBackend, UiccError};
pub use config::{EapAkaConfig, EapAkaPrimeConfig, EapSessionConfig, EapSimConfig};
pub use machine::aka::{AkaVariant, EapAkaSession};
pub use machine::sim::EapSimSession;
pub use machine::MethodError;
pub use reauth::{ReauthIdentityTracker, ReauthInfo, ReauthStore};
pub use result::{EapResult, EapSuccess};
