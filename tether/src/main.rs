use std::error::Error;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;

use tether_remote as remote;
use tether_util as util;

use crate::cli::Cli;
use crate::remote::{
    Assignment, Clock, HttpTransport, ProvisioningConfig, ProvisioningSession, RequestConfig,
    ServiceClient, SystemClock, TelemetryConfig, TelemetryError, TelemetryScheduler, TickOutcome,
    Transport,
};
use crate::util::http::Uri;

/// Wait before starting over after provisioning or hub setup fails
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How often the telemetry scheduler is checked
const TICK_PERIOD: Duration = Duration::from_secs(1);

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("debug".parse().unwrap())
                    .add_directive("hyper=error".parse().unwrap())
                    .add_directive("hyper_util=error".parse().unwrap())
                    .add_directive("rustls=error".parse().unwrap())
                    .add_directive("reqwest=info".parse().unwrap()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();

    let cli = cli::parse();

    let request_defaults = RequestConfig::default();
    let request = RequestConfig {
        timeout: cli.request_timeout.unwrap_or(request_defaults.timeout),
        poll_interval: cli.poll_interval.unwrap_or(request_defaults.poll_interval),
        max_poll_attempts: cli
            .poll_max_attempts
            .unwrap_or(request_defaults.max_poll_attempts),
        ..request_defaults
    };

    let telemetry_defaults = TelemetryConfig::default();
    let telemetry = TelemetryConfig {
        interval: cli
            .telemetry_interval
            .unwrap_or(telemetry_defaults.interval),
        store_id: cli.store_id.clone(),
        region: cli.region.clone(),
    };

    let retry_delay = cli.provisioning_retry.unwrap_or(DEFAULT_RETRY_DELAY);
    loop {
        let assignment = provision(&cli, request.clone()).await;

        let transport = HttpTransport::new(request.timeout);
        let client = ServiceClient::new(transport, SystemClock, request.clone(), telemetry.clone());
        if let Err(err) = start_telemetry(client, assignment, telemetry.interval).await {
            warn!(
                "failed to set up hub client, provisioning again in {}s: {err}",
                retry_delay.as_secs()
            );
            time::sleep(retry_delay).await;
        }
    }
}

/// Register with the broker, starting over until a hub is assigned.
///
/// Every attempt uses a fresh session, so a new broker token and operation
/// are requested each time.
#[instrument(name = "provision", skip_all)]
async fn provision(cli: &Cli, request: RequestConfig) -> Assignment {
    let retry_delay = cli.provisioning_retry.unwrap_or(DEFAULT_RETRY_DELAY);
    let config = ProvisioningConfig {
        broker_endpoint: cli
            .broker_endpoint
            .clone()
            .unwrap_or_else(|| Uri::from_static(remote::DEFAULT_BROKER_ENDPOINT)),
        request,
        ..ProvisioningConfig::new(
            cli.id_scope.clone(),
            cli.registration_id.clone(),
            cli.group_key.clone(),
        )
    };
    debug!(config = ?config, "using config:");

    loop {
        let transport = HttpTransport::new(config.request.timeout);
        let session = ProvisioningSession::new(config.clone(), transport, SystemClock);

        match session.run().await {
            Ok(assignment) => {
                info!(hub = %assignment.hub, device_id = %assignment.device_id, "device provisioned");
                return assignment;
            }
            Err(err) => {
                warn!(
                    "provisioning failed, retrying in {}s: {err}",
                    retry_delay.as_secs()
                );
                time::sleep(retry_delay).await;
            }
        }
    }
}

/// Connect to the assigned hub and keep telemetry flowing.
///
/// Only returns if the client cannot be set up for `assignment`. That
/// depends on nothing but the assignment itself, so the caller needs a new
/// one before trying again.
#[instrument(name = "telemetry", skip_all, err)]
async fn start_telemetry<T: Transport, C: Clock>(
    mut client: ServiceClient<T, C>,
    assignment: Assignment,
    interval: Duration,
) -> Result<(), TelemetryError> {
    let Assignment {
        hub,
        device_id,
        device_key,
    } = assignment;
    client.initialize(hub, device_id, device_key)?;

    let mut scheduler = TelemetryScheduler::new(interval);
    let mut ticker = time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let now = ticker.tick().await;
        if scheduler.tick(&mut client, now).await == TickOutcome::Disconnected {
            warn!("hub client disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_gives_up_on_an_assignment_it_cannot_connect_to() {
        let request = RequestConfig::default();
        let client = ServiceClient::new(
            HttpTransport::new(request.timeout),
            SystemClock,
            request,
            TelemetryConfig::default(),
        );
        let assignment = Assignment {
            hub: "bad host".to_owned(),
            device_id: "sensor-42".into(),
            device_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into(),
        };

        let result = time::timeout(
            Duration::from_secs(5),
            start_telemetry(client, assignment, Duration::from_secs(10)),
        )
        .await
        .expect("returns instead of retrying");

        assert!(matches!(result, Err(TelemetryError::InvalidHub(_))));
    }
}
