//! Shared access signature tokens
//!
//! A token authorizes requests against a single resource until an absolute
//! expiry time. The string that gets signed is fixed by the services
//! verifying it: the url-escaped resource URI, a newline, and the expiry
//! in unix seconds.

use std::time::Duration;

use thiserror::Error;

use crate::util::crypto::{self, CryptoError};
use crate::util::types::{DeviceId, HubHost, IdScope, RegistrationId, SymmetricKey};

/// Token lifetime when the caller does not pick an expiry
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3_600);

/// Tokens are renewed this long before they actually expire
pub const DEFAULT_RENEWAL_SKEW: Duration = Duration::from_secs(300);

/// Largest token we are willing to hand to the transport
pub const MAX_TOKEN_LEN: usize = 1_024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Failed to decode signing key: {0}")]
    KeyDecode(#[from] CryptoError),

    #[error("Signed token is {len} bytes, at most {capacity} are supported")]
    SignatureOverflow { len: usize, capacity: usize },

    #[error("Cannot sign for an empty {0}")]
    InvalidScope(&'static str),
}

/// Who a token is meant to be presented to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Broker,
    Service,
}

/// The resource a token grants access to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningScope {
    /// Registration with the provisioning broker
    Broker {
        id_scope: IdScope,
        registration_id: RegistrationId,
    },

    /// Device endpoints of the assigned hub
    Service { hub: HubHost, device_id: DeviceId },
}

impl SigningScope {
    pub fn audience(&self) -> Audience {
        match self {
            SigningScope::Broker { .. } => Audience::Broker,
            SigningScope::Service { .. } => Audience::Service,
        }
    }

    /// The resource URI, before escaping
    fn resource(&self) -> Result<String, TokenError> {
        match self {
            SigningScope::Broker {
                id_scope,
                registration_id,
            } => {
                if id_scope.is_empty() {
                    return Err(TokenError::InvalidScope("id scope"));
                }
                if registration_id.is_empty() {
                    return Err(TokenError::InvalidScope("registration id"));
                }
                Ok(format!("{id_scope}/registrations/{registration_id}"))
            }
            SigningScope::Service { hub, device_id } => {
                if hub.is_empty() {
                    return Err(TokenError::InvalidScope("hub host"));
                }
                if device_id.is_empty() {
                    return Err(TokenError::InvalidScope("device id"));
                }
                Ok(format!("{hub}/devices/{device_id}"))
            }
        }
    }
}

/// A signed, time scoped credential.
///
/// Tokens are never modified; renewing means replacing the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken {
    value: String,
    expiry: u64,
    audience: Audience,
}

impl SasToken {
    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }

    /// Absolute expiry in unix seconds
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    /// Whether the token is within the default renewal window at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.is_expired_with_skew(now, DEFAULT_RENEWAL_SKEW)
    }

    /// Whether `now` has reached `skew` before expiry
    pub fn is_expired_with_skew(&self, now: u64, skew: Duration) -> bool {
        now >= self.expiry.saturating_sub(skew.as_secs())
    }
}

impl std::fmt::Debug for SasToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasToken")
            .field("expiry", &self.expiry)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Issues tokens for one [`SigningScope`] with one key
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    scope: SigningScope,
    key: SymmetricKey,
    key_name: Option<String>,
    lifetime: Duration,
}

impl TokenGenerator {
    pub fn new(scope: SigningScope, key: SymmetricKey) -> Self {
        Self {
            scope,
            key,
            key_name: None,
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    /// Name of the shared access policy the key belongs to. Per device keys
    /// have none.
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into()).filter(|name| !name.is_empty());
        self
    }

    /// Lifetime applied when no explicit expiry is requested
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// The exact string signed for a token expiring at `expiry`
    pub fn string_to_sign(&self, expiry: u64) -> Result<String, TokenError> {
        let resource = self.scope.resource()?;
        Ok(format!("{}\n{expiry}", urlencoding::encode(&resource)))
    }

    /// Issue a new token.
    ///
    /// `expiry` is absolute, in unix seconds. `None` or `Some(0)` means
    /// `now` plus the configured lifetime.
    pub fn generate(&self, now: u64, expiry: Option<u64>) -> Result<SasToken, TokenError> {
        let expiry = expiry
            .filter(|expiry| *expiry != 0)
            .unwrap_or(now.saturating_add(self.lifetime.as_secs()));

        let resource = self.scope.resource()?;
        let signature = crypto::sign(&self.key, &self.string_to_sign(expiry)?)?;

        let mut value = format!(
            "SharedAccessSignature sr={}&sig={}&se={expiry}",
            urlencoding::encode(&resource),
            urlencoding::encode(&signature),
        );
        if let Some(key_name) = &self.key_name {
            value.push_str("&skn=");
            value.push_str(&urlencoding::encode(key_name));
        }

        if value.len() > MAX_TOKEN_LEN {
            return Err(TokenError::SignatureOverflow {
                len: value.len(),
                capacity: MAX_TOKEN_LEN,
            });
        }

        Ok(SasToken {
            value,
            expiry,
            audience: self.scope.audience(),
        })
    }
}
