// ABOUTME: In-memory protocol engine, metrics and sink doubles shared by the session unit tests
// ABOUTME: Records binds, submits and closes so tests can assert on engine interaction

use crate::datatypes::CommandStatus;
use crate::event::{Event, SubmitSmResp};
use crate::session::Shared;
use crate::session::config::{OverflowPolicy, SessionConfig};
use crate::session::dispatcher::EventDispatcher;
use crate::session::error::EngineError;
use crate::session::metrics::MetricsSink;
use crate::session::traits::{EngineSession, ProtocolEngine, ResponseSink, Settings};
use crate::session::types::{BindCredentials, BindType, DeliveryReport, OutboundMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

#[derive(Default)]
pub struct CountingMetrics {
    active: AtomicI64,
    durations: AtomicUsize,
}

impl CountingMetrics {
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn durations(&self) -> usize {
        self.durations.load(Ordering::SeqCst)
    }
}

impl MetricsSink for CountingMetrics {
    fn session_opened(&self, _gateway: &str) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn session_closed(&self, _gateway: &str) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn observe_session_duration(&self, _gateway: &str, _duration: Duration) {
        self.durations.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<DeliveryReport>>,
    closes: AtomicUsize,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<DeliveryReport> {
        self.reports.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ResponseSink for RecordingSink {
    fn write_response(&self, report: &DeliveryReport) {
        self.reports.lock().push(report.clone());
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub shared: Arc<Shared>,
    pub dispatcher: Arc<EventDispatcher>,
    pub metrics: Arc<CountingMetrics>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn settings(&self) -> Settings {
        Settings {
            enquire_link: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            handler: Arc::clone(&self.dispatcher),
        }
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new(
        "zain",
        BindType::Transceiver,
        BindCredentials::new("localhost:2775", "id", "secret"),
    )
    .with_rate_limit(1000.0, 1000)
    .with_max_outstanding(10)
    .with_streams(1, OverflowPolicy::Block)
}

/// Shared state for gateway "zain" with one-slot blocking streams, a loose
/// rate limit, an outstanding window of 10 and a recording sink.
pub fn harness() -> Harness {
    let metrics = Arc::new(CountingMetrics::default());
    let sink = Arc::new(RecordingSink::default());
    let shared = Arc::new(Shared::new(
        &test_config(),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        Some(Arc::clone(&sink) as Arc<dyn ResponseSink>),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&shared)));
    Harness {
        shared,
        dispatcher,
        metrics,
        sink,
    }
}

pub fn sample_report() -> DeliveryReport {
    DeliveryReport {
        sequence_number: 1,
        message_id: None,
        application_id: None,
        sender: "966500000001".to_string(),
        destination: "SENDER".to_string(),
        state: None,
        text: "hi".to_string(),
        gateway: "zain".to_string(),
        received_at: SystemTime::now(),
    }
}

/// Everything the mock engine was asked to do.
#[derive(Default)]
pub struct EngineLog {
    attempts: Mutex<Vec<BindType>>,
    completed: AtomicUsize,
    closes: Mutex<Vec<BindType>>,
    submits: Mutex<Vec<u32>>,
}

impl EngineLog {
    /// Roles of every connect call, in call order.
    pub fn attempts(&self) -> Vec<BindType> {
        self.attempts.lock().clone()
    }

    /// Connect calls that ran to completion, successful or not.
    pub fn completed_attempts(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> Vec<BindType> {
        self.closes.lock().clone()
    }

    pub fn submits(&self) -> Vec<u32> {
        self.submits.lock().clone()
    }
}

pub struct MockEngine {
    log: Arc<EngineLog>,
    /// Connect calls left to fail, across all roles
    failures: AtomicU32,
    role_failures: Mutex<HashMap<BindType, u32>>,
    connect_delay: Duration,
    fail_submits: bool,
    auto_ack: bool,
}

impl MockEngine {
    pub fn healthy() -> Self {
        Self::failing_times(0)
    }

    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            log: Arc::new(EngineLog::default()),
            failures: AtomicU32::new(failures),
            role_failures: Mutex::new(HashMap::new()),
            connect_delay: Duration::ZERO,
            fail_submits: false,
            auto_ack: false,
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail the first `failures` binds of `role` only.
    pub fn failing_role(self, role: BindType, failures: u32) -> Self {
        self.role_failures.lock().insert(role, failures);
        self
    }

    /// Every submit_sm write fails.
    pub fn failing_submits(mut self) -> Self {
        self.fail_submits = true;
        self
    }

    /// Answer every submit_sm with an OK submit_sm_resp carrying
    /// message id `msg-<sequence_number>`.
    pub fn auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }

    pub fn log(&self) -> Arc<EngineLog> {
        Arc::clone(&self.log)
    }

    fn take_failure(&self, role: BindType) -> bool {
        if let Some(left) = self.role_failures.lock().get_mut(&role) {
            if *left > 0 {
                *left -= 1;
                return true;
            }
        }
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl ProtocolEngine for MockEngine {
    type Session = MockSession;

    async fn connect(
        &self,
        role: BindType,
        _credentials: &BindCredentials,
        settings: Settings,
        _rebind_interval: Duration,
    ) -> Result<MockSession, EngineError> {
        self.log.attempts.lock().push(role);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let fail = self.take_failure(role);
        self.log.completed.fetch_add(1, Ordering::SeqCst);
        if fail {
            return Err(EngineError::ConnectionClosed);
        }
        Ok(MockSession {
            role,
            log: Arc::clone(&self.log),
            handler: settings.handler,
            fail_submits: self.fail_submits,
            auto_ack: self.auto_ack,
        })
    }
}

pub struct MockSession {
    role: BindType,
    log: Arc<EngineLog>,
    handler: Arc<EventDispatcher>,
    fail_submits: bool,
    auto_ack: bool,
}

impl MockSession {
    pub fn role(&self) -> BindType {
        self.role
    }
}

impl EngineSession for MockSession {
    async fn submit(
        &self,
        sequence_number: u32,
        _message: &OutboundMessage,
    ) -> Result<(), EngineError> {
        if self.fail_submits {
            return Err(EngineError::ConnectionClosed);
        }
        self.log.submits.lock().push(sequence_number);
        if self.auto_ack {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                handler
                    .on_event(Event::SubmitSmResp(SubmitSmResp {
                        command_status: CommandStatus::Ok,
                        sequence_number,
                        message_id: format!("msg-{sequence_number}"),
                    }))
                    .await
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.log.closes.lock().push(self.role);
        Ok(())
    }
}
