//! Session Configuration
//!
//! Per-session method configuration supplied by the caller when a method
//! instance is constructed. The subscription id selects which SIM/USIM the
//! [`IdentitySource`](crate::IdentitySource) and
//! [`UiccBackend`](crate::UiccBackend) operate on.

use serde::{Deserialize, Serialize};

/// EAP-SIM method configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapSimConfig {
    /// Subscription the session authenticates against
    pub sub_id: u32,
}

/// EAP-AKA method configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapAkaConfig {
    /// Subscription the session authenticates against
    pub sub_id: u32,
    /// Fast re-authentication identity provisioned from an earlier session
    #[serde(default)]
    pub reauth_id: Option<Vec<u8>>,
}

/// EAP-AKA' method configuration (RFC 5448)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapAkaPrimeConfig {
    /// Subscription the session authenticates against
    pub sub_id: u32,
}

/// The set of SIM/AKA-family methods a caller is willing to run.
///
/// Whether EAP-AKA' is configured feeds the bidding-down check: an EAP-AKA
/// challenge advertising AT_BIDDING while AKA' is locally available is
/// rejected (RFC 5448#4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapSessionConfig {
    #[serde(default)]
    pub sim: Option<EapSimConfig>,
    #[serde(default)]
    pub aka: Option<EapAkaConfig>,
    #[serde(default)]
    pub aka_prime: Option<EapAkaPrimeConfig>,
}

impl EapSessionConfig {
    /// Whether EAP-AKA' is available locally (drives bidding-down detection)
    pub fn supports_eap_aka_prime(&self) -> bool {
        self.aka_prime.is_some()
    }
}
