use std::time::{Duration, Instant};

use rand::Rng;
use sysinfo::System;
use tokio::time::Instant as TickInstant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::TelemetryConfig;
use crate::service::ServiceClient;
use crate::transport::Transport;
use crate::types::TelemetryPayload;
use crate::util::types::DeviceId;

/// Volatile device state reported with every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub uptime: Duration,
    pub free_memory: u64,
}

/// Samples process uptime and available memory
pub struct SystemProbe {
    started: Instant,
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            system: System::new(),
        }
    }

    pub fn sample(&mut self) -> DeviceStatus {
        self.system.refresh_memory();
        DeviceStatus {
            uptime: self.started.elapsed(),
            free_memory: self.system.available_memory(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Sensor readings. There are no sensors attached yet, so readings are
/// simulated around plausible indoor values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    pub temperature: f64,
    pub humidity: f64,
    pub battery_level: u8,
}

impl Measurements {
    pub fn simulated<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            temperature: 22.5 + f64::from(rng.random_range(-50..50_i32)) / 10.0,
            humidity: 45.0 + f64::from(rng.random_range(-100..100_i32)) / 10.0,
            battery_level: rng.random_range(85..100),
        }
    }
}

/// Assemble a telemetry message. `timestamp` is in unix seconds.
pub fn build_payload(
    device_id: DeviceId,
    config: &TelemetryConfig,
    timestamp: u64,
    status: DeviceStatus,
    measurements: Measurements,
) -> TelemetryPayload {
    TelemetryPayload {
        device_id,
        store_id: config.store_id.clone(),
        region: config.region.clone(),
        timestamp,
        firmware_version: env!("CARGO_PKG_VERSION").to_owned(),
        free_heap: status.free_memory,
        uptime: status.uptime.as_secs(),
        temperature: measurements.temperature,
        humidity: measurements.humidity,
        battery_level: measurements.battery_level,
    }
}

/// What a scheduler tick ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The client is not ready; nothing was sent
    Disconnected,
    /// The interval since the last send has not elapsed
    NotDue,
    Sent,
    /// A send was attempted and failed; the next tick tries again
    Failed,
}

/// Sends telemetry at most once per interval.
///
/// The scheduler never waits on its own; something has to call
/// [`tick`](Self::tick) periodically, typically more often than the
/// interval.
#[derive(Debug)]
pub struct TelemetryScheduler {
    interval: Duration,
    last_sent: Option<TickInstant>,
}

impl TelemetryScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Time of the last successful send, or of the last tick that found the
    /// client disconnected. `None` means never.
    pub fn last_sent(&self) -> Option<TickInstant> {
        self.last_sent
    }

    pub async fn tick<T: Transport, C: Clock>(
        &mut self,
        client: &mut ServiceClient<T, C>,
        now: TickInstant,
    ) -> TickOutcome {
        if !client.is_connected() {
            // start counting from here so reconnecting doesn't send in a burst
            self.last_sent = Some(now);
            return TickOutcome::Disconnected;
        }

        let due = self
            .last_sent
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            return TickOutcome::NotDue;
        }

        debug!("sending periodic telemetry");
        let payload = match client.create_telemetry_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to assemble telemetry: {err}");
                return TickOutcome::Failed;
            }
        };
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(err) => {
                warn!("failed to serialize telemetry: {err}");
                return TickOutcome::Failed;
            }
        };

        match client.send_telemetry(body).await {
            Ok(()) => {
                info!("telemetry sent");
                self.last_sent = Some(now);
                TickOutcome::Sent
            }
            Err(err) => {
                warn!("failed to send telemetry, will retry: {err}");
                TickOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::testing::{ManualClock, ScriptedTransport};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const DEVICE_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    const NOW: u64 = 1_700_000_000;
    const INTERVAL: Duration = Duration::from_secs(10);

    fn client(transport: &ScriptedTransport) -> ServiceClient<ScriptedTransport, ManualClock> {
        ServiceClient::new(
            transport.clone(),
            ManualClock::at(NOW),
            RequestConfig::default(),
            TelemetryConfig::default(),
        )
    }

    fn connected(transport: &ScriptedTransport) -> ServiceClient<ScriptedTransport, ManualClock> {
        let mut client = client(transport);
        client
            .initialize(
                "hub-01.example.net".to_owned(),
                "sensor-42".into(),
                DEVICE_KEY.into(),
            )
            .unwrap();
        client
    }

    #[test]
    fn it_assembles_the_payload_from_its_inputs() {
        let config = TelemetryConfig {
            store_id: Some("store-7".to_owned()),
            region: Some("eu-west".to_owned()),
            ..TelemetryConfig::default()
        };
        let status = DeviceStatus {
            uptime: Duration::from_millis(12_900),
            free_memory: 4_096,
        };
        let measurements = Measurements {
            temperature: 21.0,
            humidity: 40.5,
            battery_level: 97,
        };

        let payload = build_payload("sensor-42".into(), &config, NOW, status, measurements);

        assert_eq!(
            payload,
            TelemetryPayload {
                device_id: "sensor-42".into(),
                store_id: Some("store-7".to_owned()),
                region: Some("eu-west".to_owned()),
                timestamp: NOW,
                firmware_version: env!("CARGO_PKG_VERSION").to_owned(),
                free_heap: 4_096,
                uptime: 12,
                temperature: 21.0,
                humidity: 40.5,
                battery_level: 97,
            }
        );
    }

    #[test]
    fn it_keeps_simulated_readings_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let m = Measurements::simulated(&mut rng);
            assert!((17.5..27.5).contains(&m.temperature));
            assert!((35.0..55.0).contains(&m.humidity));
            assert!((85..100).contains(&m.battery_level));
        }
    }

    #[test]
    fn it_reports_a_growing_uptime() {
        let mut probe = SystemProbe::new();
        let first = probe.sample();
        let second = probe.sample();
        assert!(second.uptime >= first.uptime);
    }

    #[tokio::test]
    async fn it_never_sends_while_disconnected() {
        let transport = ScriptedTransport::new();
        let mut client = client(&transport);
        let mut scheduler = TelemetryScheduler::new(INTERVAL);

        let now = TickInstant::now();
        assert_eq!(
            scheduler.tick(&mut client, now).await,
            TickOutcome::Disconnected
        );
        assert_eq!(scheduler.last_sent(), Some(now));

        let later = now + Duration::from_secs(60);
        assert_eq!(
            scheduler.tick(&mut client, later).await,
            TickOutcome::Disconnected
        );
        assert_eq!(scheduler.last_sent(), Some(later));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn it_sends_right_away_the_first_time() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "");
        let mut client = connected(&transport);
        let mut scheduler = TelemetryScheduler::new(INTERVAL);

        let now = TickInstant::now();
        assert_eq!(scheduler.tick(&mut client, now).await, TickOutcome::Sent);
        assert_eq!(scheduler.last_sent(), Some(now));

        let body: serde_json::Value =
            serde_json::from_str(transport.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["deviceId"], "sensor-42");
        assert_eq!(body["timestamp"], NOW);
    }

    #[tokio::test]
    async fn it_waits_a_full_interval_between_sends() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(204, "");
        let mut client = connected(&transport);
        let mut scheduler = TelemetryScheduler::new(INTERVAL);

        let start = TickInstant::now();
        assert_eq!(scheduler.tick(&mut client, start).await, TickOutcome::Sent);
        assert_eq!(
            scheduler
                .tick(&mut client, start + Duration::from_secs(9))
                .await,
            TickOutcome::NotDue
        );
        assert_eq!(
            scheduler.tick(&mut client, start + INTERVAL).await,
            TickOutcome::Sent
        );
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn it_retries_on_the_next_tick_after_a_failure() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(500, "oops").respond(204, "");
        let mut client = connected(&transport);
        let mut scheduler = TelemetryScheduler::new(INTERVAL);

        let start = TickInstant::now();
        scheduler.tick(&mut client, start).await;

        let due = start + INTERVAL;
        assert_eq!(scheduler.tick(&mut client, due).await, TickOutcome::Failed);
        assert_eq!(scheduler.last_sent(), Some(start));

        // no need to wait another interval
        let retry = due + Duration::from_secs(1);
        assert_eq!(scheduler.tick(&mut client, retry).await, TickOutcome::Sent);
        assert_eq!(scheduler.last_sent(), Some(retry));
    }

    #[tokio::test]
    async fn it_waits_an_interval_after_reconnecting() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "");
        let mut disconnected = client(&transport);
        let mut scheduler = TelemetryScheduler::new(INTERVAL);

        let start = TickInstant::now();
        scheduler.tick(&mut disconnected, start).await;

        let mut client = connected(&transport);
        assert_eq!(
            scheduler
                .tick(&mut client, start + Duration::from_secs(5))
                .await,
            TickOutcome::NotDue
        );
        assert_eq!(
            scheduler.tick(&mut client, start + INTERVAL).await,
            TickOutcome::Sent
        );
    }
}
