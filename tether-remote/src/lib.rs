/*
Everything related to the cloud side of a device.

A device first registers with the provisioning broker, proving membership
of an enrollment group with a key derived from the group key. The broker
assigns it to a hub, and from then on the device signs its own tokens for
that hub and streams telemetry to it, renewing credentials before they
expire.
*/

mod clock;
mod config;
mod provisioning;
mod service;
mod telemetry;
mod token;
mod transport;

#[cfg(test)]
mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{DEFAULT_BROKER_ENDPOINT, ProvisioningConfig, RequestConfig, TelemetryConfig};
pub use provisioning::{Assignment, ProvisioningError, ProvisioningSession, ProvisioningState};
pub use service::{ServiceClient, TelemetryError};
pub use telemetry::{
    DeviceStatus, Measurements, SystemProbe, TelemetryScheduler, TickOutcome, build_payload,
};
pub use token::{
    Audience, DEFAULT_RENEWAL_SKEW, DEFAULT_TOKEN_LIFETIME, MAX_TOKEN_LEN, SasToken, SigningScope,
    TokenError, TokenGenerator,
};
pub use transport::{HttpTransport, Request, Response, Transport, TransportError};

use tether_remote_types as types;
use tether_util as util;
