use std::time::Duration;

use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::{Span, debug, error, field, info, instrument, warn};

use crate::clock::Clock;
use crate::config::ProvisioningConfig;
use crate::token::{SasToken, SigningScope, TokenError, TokenGenerator};
use crate::transport::{Request, Transport, TransportError};
use crate::types::{
    InvalidResponseError, OperationOutcome, RegistrationAccepted, RegistrationRequest,
};
use crate::util::crypto::{CryptoError, derive_device_key};
use crate::util::http::{InvalidUriError, Uri};
use crate::util::types::{DeviceId, HubHost, SymmetricKey};

/// Broker API version the registration paths belong to
const API_VERSION: &str = "api-version=2019-03-31";

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Failed to derive device key: {0}")]
    Credential(#[from] CryptoError),

    #[error("Failed to generate broker token: {0}")]
    Token(#[from] TokenError),

    #[error("Invalid broker endpoint URI: {0}")]
    InvalidBroker(#[from] InvalidUriError),

    #[error("Request encoding failed: {0}")]
    RequestEncoding(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Registration rejected: ({0}) {1}")]
    RegistrationRejected(StatusCode, String),

    #[error("Remote returned error: ({0}) {1}")]
    Status(StatusCode, String),

    #[error("Malformed broker response: {0}")]
    MalformedResponse(#[from] InvalidResponseError),

    #[error("Broker reported failure: {0}")]
    BrokerReportedFailure(String),

    #[error("Assignment not completed after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Provisioning was not completed")]
    Incomplete,
}

/// The result of a successful provisioning: where the device lives now and
/// the key it authenticates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub hub: HubHost,
    pub device_id: DeviceId,
    pub device_key: SymmetricKey,
}

/// Provisioning progress.
///
/// States only move forward. `Polling` may repeat itself until one of
/// `Assigned`, `Failed` or `TimedOut` is reached, all of which are final.
#[derive(Debug)]
pub enum ProvisioningState {
    NotStarted,
    Registering,
    Polling { operation_id: String, attempts: u32 },
    Assigned(Assignment),
    Failed(ProvisioningError),
    TimedOut,
}

impl ProvisioningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Assigned(_)
                | ProvisioningState::Failed(_)
                | ProvisioningState::TimedOut
        )
    }
}

/// A single use registration with the provisioning broker.
///
/// Each call to [`advance`](Self::advance) performs exactly one step and
/// never sleeps; whoever drives the session is expected to wait
/// [`next_delay`](Self::next_delay) between steps. [`run`](Self::run) does
/// exactly that.
pub struct ProvisioningSession<T, C> {
    config: ProvisioningConfig,
    transport: T,
    clock: C,
    state: ProvisioningState,
    device_key: Option<SymmetricKey>,
    token: Option<SasToken>,
}

impl<T: Transport, C: Clock> ProvisioningSession<T, C> {
    pub fn new(config: ProvisioningConfig, transport: T, clock: C) -> Self {
        Self {
            config,
            transport,
            clock,
            state: ProvisioningState::NotStarted,
            device_key: None,
            token: None,
        }
    }

    pub fn state(&self) -> &ProvisioningState {
        &self.state
    }

    /// How long to wait before the next call to `advance`, if there is
    /// anything left to do.
    pub fn next_delay(&self) -> Option<Duration> {
        match self.state {
            ProvisioningState::NotStarted => Some(Duration::ZERO),
            ProvisioningState::Polling { .. } => Some(self.config.request.poll_interval),
            _ => None,
        }
    }

    /// Register the device with the broker.
    ///
    /// Derives the device key, issues a broker token and submits the
    /// registration. On acceptance the session moves on to polling,
    /// otherwise it fails for good.
    #[instrument(name = "register", skip_all, fields(registration_id = %self.config.registration_id))]
    pub async fn start(&mut self) -> &ProvisioningState {
        if !matches!(self.state, ProvisioningState::NotStarted) {
            warn!("provisioning session already started");
            return &self.state;
        }

        self.state = ProvisioningState::Registering;
        self.state = match self.register().await {
            Ok(operation_id) => {
                info!(operation_id = %operation_id, "registration accepted");
                ProvisioningState::Polling {
                    operation_id,
                    attempts: 0,
                }
            }
            Err(err) => {
                error!("registration failed: {err}");
                ProvisioningState::Failed(err)
            }
        };

        &self.state
    }

    /// Perform the next step for the current state
    pub async fn advance(&mut self) -> &ProvisioningState {
        match self.state {
            ProvisioningState::NotStarted => self.start().await,
            ProvisioningState::Polling { .. } => self.poll().await,
            _ => &self.state,
        }
    }

    /// Drive the session to completion, waiting the poll interval before
    /// every status query.
    pub async fn run(mut self) -> Result<Assignment, ProvisioningError> {
        while let Some(delay) = self.next_delay() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.advance().await;
        }
        self.into_result()
    }

    /// Consume the session, handing over the assignment if there is one
    pub fn into_assignment(self) -> Option<Assignment> {
        self.into_result().ok()
    }

    fn into_result(self) -> Result<Assignment, ProvisioningError> {
        match self.state {
            ProvisioningState::Assigned(assignment) => Ok(assignment),
            ProvisioningState::Failed(err) => Err(err),
            ProvisioningState::TimedOut => Err(ProvisioningError::TimedOut {
                attempts: self.config.request.max_poll_attempts,
            }),
            _ => Err(ProvisioningError::Incomplete),
        }
    }

    async fn register(&mut self) -> Result<String, ProvisioningError> {
        let ProvisioningConfig {
            broker_endpoint,
            id_scope,
            registration_id,
            group_key,
            ..
        } = &self.config;

        let device_key = derive_device_key(group_key, registration_id)?;
        debug!("device key derived");

        let generator = self.broker_token_generator(device_key.clone());
        let token = generator.generate(self.clock.now(), None)?;

        let uri = Uri::from_parts(
            broker_endpoint.clone(),
            &format!(
                "/{}/registrations/{}/register",
                urlencoding::encode(id_scope),
                urlencoding::encode(registration_id),
            ),
            Some(API_VERSION),
        )?;
        let body = serde_json::to_string(&RegistrationRequest {
            registration_id: registration_id.clone(),
        })?;

        debug!("calling broker");
        let request = Request::new(Method::PUT, uri)
            .with_header("authorization", token.as_str())
            .with_json(body);
        let response = self.transport.send(request).await?;

        if response.status != StatusCode::ACCEPTED {
            return Err(ProvisioningError::RegistrationRejected(
                response.status,
                response.body,
            ));
        }

        let accepted = RegistrationAccepted::parse(&response.body)?;

        self.device_key = Some(device_key);
        self.token = Some(token);
        Ok(accepted.operation_id)
    }

    #[instrument(name = "poll", skip_all, fields(attempt = field::Empty))]
    async fn poll(&mut self) -> &ProvisioningState {
        let (operation_id, attempts) = match &self.state {
            ProvisioningState::Polling {
                operation_id,
                attempts,
            } => (operation_id.clone(), attempts + 1),
            _ => return &self.state,
        };
        let max_attempts = self.config.request.max_poll_attempts;
        Span::current().record("attempt", attempts);

        let next = match self.query_status(&operation_id).await {
            Ok(OperationOutcome::Assigned { hub, device_id }) => {
                info!(hub = %hub, device_id = %device_id, "device assigned");
                match self.device_key.take() {
                    Some(device_key) => ProvisioningState::Assigned(Assignment {
                        hub,
                        device_id,
                        device_key,
                    }),
                    None => ProvisioningState::Failed(ProvisioningError::Incomplete),
                }
            }
            Ok(OperationOutcome::Failed { details }) => {
                error!("broker reported failure: {details}");
                ProvisioningState::Failed(ProvisioningError::BrokerReportedFailure(details))
            }
            Ok(OperationOutcome::Pending(status)) => {
                debug!(?status, "assignment pending");
                ProvisioningState::Polling {
                    operation_id,
                    attempts,
                }
            }
            Err(err) => {
                warn!("status query failed: {err}");
                ProvisioningState::Polling {
                    operation_id,
                    attempts,
                }
            }
        };

        self.state = match next {
            ProvisioningState::Polling { .. } if attempts >= max_attempts => {
                error!("assignment timed out after {attempts} attempts");
                ProvisioningState::TimedOut
            }
            next => next,
        };

        &self.state
    }

    async fn query_status(&mut self, operation_id: &str) -> Result<OperationOutcome, ProvisioningError> {
        let ProvisioningConfig {
            broker_endpoint,
            id_scope,
            registration_id,
            ..
        } = &self.config;

        let uri = Uri::from_parts(
            broker_endpoint.clone(),
            &format!(
                "/{}/registrations/{}/operations/{}",
                urlencoding::encode(id_scope),
                urlencoding::encode(registration_id),
                urlencoding::encode(operation_id),
            ),
            Some(API_VERSION),
        )?;
        let token = self.broker_token()?;

        let request = Request::new(Method::GET, uri).with_header("authorization", token.as_str());
        let response = self.transport.send(request).await?;

        if response.status != StatusCode::OK {
            return Err(ProvisioningError::Status(response.status, response.body));
        }

        Ok(OperationOutcome::parse(&response.body)?)
    }

    /// The registration token, reissued if it is about to expire
    fn broker_token(&mut self) -> Result<SasToken, ProvisioningError> {
        let now = self.clock.now();
        let skew = self.config.request.renewal_skew;

        match (&self.token, &self.device_key) {
            (Some(token), _) if !token.is_expired_with_skew(now, skew) => Ok(token.clone()),
            (_, Some(device_key)) => {
                debug!("renewing broker token");
                let token = self
                    .broker_token_generator(device_key.clone())
                    .generate(now, None)?;
                self.token = Some(token.clone());
                Ok(token)
            }
            (_, None) => Err(ProvisioningError::Incomplete),
        }
    }

    fn broker_token_generator(&self, device_key: SymmetricKey) -> TokenGenerator {
        TokenGenerator::new(
            SigningScope::Broker {
                id_scope: self.config.id_scope.clone(),
                registration_id: self.config.registration_id.clone(),
            },
            device_key,
        )
        .with_lifetime(self.config.request.token_lifetime)
    }
}
