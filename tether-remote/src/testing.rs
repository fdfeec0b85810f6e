//! Test doubles for the transport and clock collaborators

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;

use crate::clock::Clock;
use crate::transport::{Request, Response, Transport, TransportError};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<Response, TransportError>>,
    requests: Vec<Request>,
}

/// Replays queued responses in order and records every request.
///
/// Clones share the same script, so a test can keep a handle after moving
/// the transport into the code under test. Running out of responses is
/// reported as a connection failure.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: impl Into<String>) -> &Self {
        let status = StatusCode::from_u16(status).expect("valid status code");
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back(Ok(Response::new(status, body)));
        self
    }

    pub fn fail(&self, err: TransportError) -> &Self {
        self.script.lock().unwrap().responses.push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted response".to_owned())))
    }
}

/// A clock that only moves when told to
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn at(now: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
