use clap::Parser;
use std::num::ParseIntError;
use std::time::Duration;

use crate::util::http::Uri;
use crate::util::types::{IdScope, RegistrationId, SymmetricKey};

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Identifier to register this device with
    #[arg(
        env = "TETHER_REGISTRATION_ID",
        long = "registration-id",
        value_name = "id"
    )]
    pub registration_id: RegistrationId,

    /// Scope of the enrollment group at the provisioning broker
    #[arg(env = "TETHER_ID_SCOPE", long = "id-scope", value_name = "scope")]
    pub id_scope: IdScope,

    /// Base64 encoded enrollment group key
    #[arg(
        env = "TETHER_GROUP_KEY",
        long = "group-key",
        value_name = "key",
        hide_env_values = true
    )]
    pub group_key: SymmetricKey,

    /// Provisioning broker endpoint URI
    #[arg(
        env = "TETHER_BROKER_ENDPOINT",
        long = "broker-endpoint",
        value_name = "uri"
    )]
    pub broker_endpoint: Option<Uri>,

    /// Request timeout in milliseconds
    #[arg(
        env = "TETHER_REQUEST_TIMEOUT_MS",
        long = "request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub request_timeout: Option<Duration>,

    /// Assignment status poll interval in milliseconds
    #[arg(
        env = "TETHER_POLL_INTERVAL_MS",
        long = "poll-interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub poll_interval: Option<Duration>,

    /// Number of status polls before provisioning gives up
    #[arg(
        env = "TETHER_POLL_MAX_ATTEMPTS",
        long = "poll-max-attempts",
        value_name = "int"
    )]
    pub poll_max_attempts: Option<u32>,

    /// Wait before provisioning again after a failed attempt, in milliseconds
    #[arg(
        env = "TETHER_PROVISIONING_RETRY_MS",
        long = "provisioning-retry-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub provisioning_retry: Option<Duration>,

    /// Telemetry send interval in milliseconds
    #[arg(
        env = "TETHER_TELEMETRY_INTERVAL_MS",
        long = "telemetry-interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub telemetry_interval: Option<Duration>,

    /// Store identifier reported with telemetry
    #[arg(env = "TETHER_STORE_ID", long = "store-id", value_name = "str")]
    pub store_id: Option<String>,

    /// Region reported with telemetry
    #[arg(env = "TETHER_REGION", long = "region", value_name = "str")]
    pub region: Option<String>,
}

pub fn parse() -> Cli {
    Parser::parse()
}
