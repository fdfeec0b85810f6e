//! Types exchanged with the provisioning broker and the telemetry hub
//!
//! All input validations should happen here. Broker responses are decoded
//! into loose raw structs first and then checked for the fields a given
//! status requires, so callers only ever see well formed outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_util::types::{DeviceId, HubHost, RegistrationId};

#[derive(Debug, Error)]
pub enum InvalidResponseError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

/// Body of the registration PUT
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub registration_id: RegistrationId,
}

/// The broker accepted the registration and is assigning the device
/// asynchronously. Assignment progress is tracked through `operation_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationAccepted {
    pub operation_id: String,
}

impl RegistrationAccepted {
    pub fn parse(body: &str) -> Result<Self, InvalidResponseError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            operation_id: Option<String>,
        }

        let raw: Raw = serde_json::from_str(body)?;
        match raw.operation_id {
            Some(operation_id) if !operation_id.is_empty() => Ok(Self { operation_id }),
            _ => Err(InvalidResponseError::MissingField("operationId")),
        }
    }
}

/// Assignment status as reported by the broker
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Assigning,
    Assigned,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Outcome of a single assignment status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Assignment is still in progress (or in a state we don't act on)
    Pending(OperationStatus),

    /// The device was assigned to `hub` under `device_id`
    Assigned { hub: HubHost, device_id: DeviceId },

    /// The broker gave up on this registration
    Failed { details: String },
}

impl OperationOutcome {
    pub fn parse(body: &str) -> Result<Self, InvalidResponseError> {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct RawRegistrationState {
            assigned_hub: Option<String>,
            device_id: Option<String>,
            error_message: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            status: Option<OperationStatus>,
            #[serde(default)]
            registration_state: Option<RawRegistrationState>,
        }

        let raw: Raw = serde_json::from_str(body)?;
        let status = raw
            .status
            .ok_or(InvalidResponseError::MissingField("status"))?;
        let state = raw.registration_state.unwrap_or_default();

        match status {
            OperationStatus::Assigned => {
                let hub = state
                    .assigned_hub
                    .filter(|hub| !hub.is_empty())
                    .ok_or(InvalidResponseError::MissingField(
                        "registrationState.assignedHub",
                    ))?;
                let device_id = state
                    .device_id
                    .filter(|id| !id.is_empty())
                    .ok_or(InvalidResponseError::MissingField(
                        "registrationState.deviceId",
                    ))?;
                Ok(Self::Assigned {
                    hub,
                    device_id: device_id.into(),
                })
            }
            OperationStatus::Failed => Ok(Self::Failed {
                details: state
                    .error_message
                    .unwrap_or_else(|| body.trim().to_owned()),
            }),
            status => Ok(Self::Pending(status)),
        }
    }
}

/// Telemetry message sent to the hub.
///
/// Assembled fresh for every send; it carries no identity beyond its
/// timestamp.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub device_id: DeviceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    pub firmware_version: String,
    /// Available memory in bytes
    pub free_heap: u64,
    /// Process uptime in seconds
    pub uptime: u64,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_level: u8,
}
