use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::{Span, debug, field, info, instrument, warn};

use crate::clock::Clock;
use crate::config::{RequestConfig, TelemetryConfig};
use crate::telemetry::{Measurements, SystemProbe, build_payload};
use crate::token::{SasToken, SigningScope, TokenError, TokenGenerator};
use crate::transport::{Request, Transport, TransportError};
use crate::types::TelemetryPayload;
use crate::util::http::{InvalidUriError, Uri};
use crate::util::types::{DeviceId, HubHost, SymmetricKey};

/// Hub API version the telemetry path belongs to
const API_VERSION: &str = "api-version=2020-03-13";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Service client is not initialized")]
    NotInitialized,

    #[error("Failed to issue hub token: {0}")]
    Renewal(#[from] TokenError),

    #[error("Invalid hub URI: {0}")]
    InvalidHub(#[from] InvalidUriError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Hub returned error: ({0}) {1}")]
    Status(StatusCode, String),
}

/// Where telemetry goes and how to sign for it
struct Connection {
    hub: HubHost,
    device_id: DeviceId,
    events_uri: Uri,
    generator: TokenGenerator,
}

/// Client for the hub a device was assigned to.
///
/// Owns the live hub token and replaces it before it reaches the renewal
/// window, so a send never goes out with a stale credential.
pub struct ServiceClient<T, C> {
    transport: T,
    clock: C,
    request: RequestConfig,
    telemetry: TelemetryConfig,
    probe: SystemProbe,
    connection: Option<Connection>,
    token: Option<SasToken>,
    last_telemetry: Option<u64>,
}

impl<T: Transport, C: Clock> ServiceClient<T, C> {
    pub fn new(transport: T, clock: C, request: RequestConfig, telemetry: TelemetryConfig) -> Self {
        Self {
            transport,
            clock,
            request,
            telemetry,
            probe: SystemProbe::new(),
            connection: None,
            token: None,
            last_telemetry: None,
        }
    }

    /// Point the client at `hub` and issue the first token.
    ///
    /// Failing to issue the token leaves the client disconnected; calling
    /// `initialize` again starts over.
    #[instrument(skip_all, fields(hub = %hub, device_id = %device_id), err)]
    pub fn initialize(
        &mut self,
        hub: HubHost,
        device_id: DeviceId,
        key: SymmetricKey,
    ) -> Result<(), TelemetryError> {
        self.connection = None;
        self.token = None;

        let events_uri = Uri::from_parts(
            Uri::from_host(&hub)?,
            &format!("/devices/{device_id}/messages/events"),
            Some(API_VERSION),
        )?;
        let generator = TokenGenerator::new(
            SigningScope::Service {
                hub: hub.clone(),
                device_id: device_id.clone(),
            },
            key,
        )
        .with_lifetime(self.request.token_lifetime);

        self.connection = Some(Connection {
            hub,
            device_id,
            events_uri,
            generator,
        });
        self.refresh_token()?;

        info!("service client initialized");
        Ok(())
    }

    /// Whether the client has everything it needs to send. This says
    /// nothing about the network.
    pub fn is_connected(&self) -> bool {
        match (&self.connection, &self.token) {
            (Some(conn), Some(token)) => {
                !conn.hub.is_empty() && !conn.device_id.is_empty() && !token.as_str().is_empty()
            }
            _ => false,
        }
    }

    /// The live hub token, if any
    pub fn token(&self) -> Option<&SasToken> {
        self.token.as_ref()
    }

    /// Clock time of the last telemetry the hub accepted
    pub fn last_telemetry(&self) -> Option<u64> {
        self.last_telemetry
    }

    /// Issue a new token, replacing the current one only on success
    pub fn refresh_token(&mut self) -> Result<(), TelemetryError> {
        let conn = self
            .connection
            .as_ref()
            .ok_or(TelemetryError::NotInitialized)?;

        let now = self.clock.now();
        let expiry = now.saturating_add(self.request.token_lifetime.as_secs());
        let token = conn.generator.generate(now, Some(expiry))?;

        debug!(expiry, "hub token refreshed");
        self.token = Some(token);
        Ok(())
    }

    /// Send a JSON telemetry message to the hub.
    ///
    /// The token is renewed first if it is missing or inside the renewal
    /// window. If renewal fails nothing is sent and the current token is
    /// kept.
    #[instrument(name = "telemetry", skip_all, fields(status = field::Empty), err)]
    pub async fn send_telemetry(&mut self, payload: String) -> Result<(), TelemetryError> {
        let now = self.clock.now();
        let needs_renewal = self
            .token
            .as_ref()
            .is_none_or(|token| token.is_expired_with_skew(now, self.request.renewal_skew));
        if needs_renewal {
            debug!("hub token expired, refreshing");
            self.refresh_token()?;
        }

        let (conn, token) = match (&self.connection, &self.token) {
            (Some(conn), Some(token)) => (conn, token),
            _ => return Err(TelemetryError::NotInitialized),
        };

        let message_id = uuid::Uuid::new_v4().simple().to_string();
        debug!(message_id = %message_id, "sending telemetry");
        let request = Request::new(Method::POST, conn.events_uri.clone())
            .with_header("authorization", token.as_str())
            .with_header("iothub-messageid", message_id)
            .with_json(payload);

        let response = self.transport.send(request).await?;
        Span::current().record("status", field::display(response.status));

        match response.status {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                self.last_telemetry = Some(self.clock.now());
                Ok(())
            }
            status => {
                warn!("telemetry rejected by hub");
                Err(TelemetryError::Status(status, response.body))
            }
        }
    }

    /// Assemble a telemetry message from the current device state
    pub fn create_telemetry_payload(&mut self) -> Result<TelemetryPayload, TelemetryError> {
        let device_id = self
            .connection
            .as_ref()
            .map(|conn| conn.device_id.clone())
            .ok_or(TelemetryError::NotInitialized)?;

        let status = self.probe.sample();
        let measurements = Measurements::simulated(&mut rand::rng());

        Ok(build_payload(
            device_id,
            &self.telemetry,
            self.clock.now(),
            status,
            measurements,
        ))
    }
}
