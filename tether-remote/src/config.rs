use std::time::Duration;

use crate::util::http::Uri;
use crate::util::types::{IdScope, RegistrationId, SymmetricKey};

/// Global provisioning broker endpoint
pub const DEFAULT_BROKER_ENDPOINT: &str = "https://global.azure-devices-provisioning.net";

/// Everything needed to register this device with the broker
#[derive(Clone, Debug)]
pub struct ProvisioningConfig {
    pub broker_endpoint: Uri,
    pub id_scope: IdScope,
    pub registration_id: RegistrationId,

    /// Enrollment group key the device key is derived from
    pub group_key: SymmetricKey,

    pub request: RequestConfig,
}

impl ProvisioningConfig {
    pub fn new(
        id_scope: IdScope,
        registration_id: RegistrationId,
        group_key: SymmetricKey,
    ) -> Self {
        Self {
            broker_endpoint: Uri::from_static(DEFAULT_BROKER_ENDPOINT),
            id_scope,
            registration_id,
            group_key,
            request: RequestConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestConfig {
    /// Maximum time to wait for a single request to complete
    pub timeout: Duration,

    /// Wait between assignment status queries
    pub poll_interval: Duration,

    /// Number of status queries before giving up on assignment
    pub max_poll_attempts: u32,

    /// Validity of newly issued tokens
    pub token_lifetime: Duration,

    /// How long before expiry a token is considered stale
    pub renewal_skew: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(59_000),
            poll_interval: Duration::from_millis(3_000),
            max_poll_attempts: 20,
            token_lifetime: Duration::from_secs(3_600),
            renewal_skew: Duration::from_secs(300),
        }
    }
}

/// Telemetry settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Minimum time between two successful sends
    pub interval: Duration,

    pub store_id: Option<String>,
    pub region: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10_000),
            store_id: None,
            region: None,
        }
    }
}
