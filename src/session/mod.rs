// ABOUTME: Gateway session orchestration: connection supervision, admission control, dispatch and shutdown
// ABOUTME: Exports the Session aggregate and every component it is assembled from

//! Gateway Session Module
//!
//! A [`Session`] owns everything needed to keep one SMPP gateway usable:
//!
//! * **ConnectionSupervisor** - binds the configured role(s) through the
//!   protocol engine, with exponential backoff under a retry budget
//! * **RateGate** - token bucket plus outstanding window in front of submit_sm
//! * **EventDispatcher** - handles every PDU the engine decodes
//! * **MessageStatusTable** - per-message status keyed by sequence number
//! * **Stream** - delivery reports and resend requests for the application
//! * **ShutdownCoordinator** - ordered teardown on `stop()`
//!
//! The wire protocol itself lives in an external engine that implements
//! [`ProtocolEngine`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smpp_session::session::{
//!     BindCredentials, BindType, OutboundMessage, ProtocolEngine, Session, SessionConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example<E: ProtocolEngine>(engine: E) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new(
//!     "zain",
//!     BindType::Transceiver,
//!     BindCredentials::new("smsc.example.com:2775", "system_id", "password"),
//! )
//! .with_rate_limit(20.0, 5)
//! .with_max_outstanding(10);
//!
//! let session = Session::builder(config, engine).build()?;
//! session.start(CancellationToken::new()).await?;
//!
//! let mut deliveries = session.deliveries();
//! tokio::spawn(async move {
//!     while let Some(report) = deliveries.recv().await {
//!         println!("{} -> {:?}", report.sender, report.state);
//!     }
//! });
//!
//! let sequence_number = session
//!     .submit(OutboundMessage::new(1, "SENDER", "966500000000", "Hello!"))
//!     .await?;
//! println!("submitted as {sequence_number}");
//!
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod rate_gate;
pub mod shutdown;
pub mod status;
pub mod stream;
pub mod supervisor;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BackoffConfig, OverflowPolicy, SessionConfig, ShutdownConfig};
pub use dispatcher::EventDispatcher;
pub use error::{ConfigError, EngineError, SessionError, SessionResult};
pub use metrics::{MetricsSink, RecorderMetrics};
pub use rate_gate::{RateGate, SubmitPermit};
pub use shutdown::{OneShotGate, ShutdownCoordinator, ShutdownPhase};
pub use status::{MessageStatus, MessageStatusTable};
pub use stream::{Consumer, Stream, StreamClosed};
pub use supervisor::{ConnectionSupervisor, RoleSessions};
pub use traits::{EngineSession, ProtocolEngine, ResponseSink, Settings};
pub use types::{
    BindCredentials, BindType, DeliveryReport, MessageState, OutboundMessage, ResendReason,
    ResendRequest,
};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Largest sequence number; numbering wraps back to 1 after it.
const MAX_SEQUENCE_NUMBER: u32 = 0x7FFF_FFFF;

/// State shared by the dispatcher, the shutdown coordinator and the session.
pub(crate) struct Shared {
    pub(crate) gateway: String,
    pub(crate) started_at: Instant,
    pub(crate) status: MessageStatusTable,
    pub(crate) rate_gate: RateGate,
    pub(crate) deliveries: Stream<DeliveryReport>,
    pub(crate) resends: Stream<ResendRequest>,
    /// In-flight deliver_sm handlers
    pub(crate) delivery_work: TaskTracker,
    /// Cancelled once stop begins
    pub(crate) shutdown: CancellationToken,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) sink: Option<Arc<dyn ResponseSink>>,
}

impl Shared {
    pub(crate) fn new(
        config: &SessionConfig,
        metrics: Arc<dyn MetricsSink>,
        sink: Option<Arc<dyn ResponseSink>>,
    ) -> Self {
        let window = config.has_outstanding.then_some(config.max_outstanding);
        Self {
            gateway: config.gateway.clone(),
            started_at: Instant::now(),
            status: MessageStatusTable::new(),
            rate_gate: RateGate::new(config.rate_limit, config.burst_limit, window),
            deliveries: Stream::new(config.stream_capacity, config.overflow_policy),
            resends: Stream::new(config.stream_capacity, config.overflow_policy),
            delivery_work: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            metrics,
            sink,
        }
    }
}

/// Builder for [`Session`]
///
/// Collaborators that are objects rather than plain settings (metrics and
/// the optional response sink) are attached here.
pub struct SessionBuilder<E> {
    config: SessionConfig,
    engine: E,
    metrics: Arc<dyn MetricsSink>,
    sink: Option<Arc<dyn ResponseSink>>,
}

impl<E: ProtocolEngine> SessionBuilder<E> {
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Persist every inbound delivery through `sink`.
    pub fn response_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and assemble the session.
    pub fn build(self) -> SessionResult<Session<E>> {
        let config = self.config;
        config.validate()?;

        let shared = Arc::new(Shared::new(&config, self.metrics, self.sink));
        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&shared)));
        let shutdown = ShutdownCoordinator::new(Arc::clone(&shared), config.shutdown.clone());
        let supervisor = ConnectionSupervisor::new(
            self.engine,
            config.gateway.clone(),
            config.bind_type,
            config.credentials.clone(),
            config.rebind_interval,
            config.backoff.clone(),
            config.max_retries,
        );

        Ok(Session {
            shared,
            dispatcher,
            shutdown,
            supervisor,
            sessions: Mutex::new(RoleSessions::default()),
            started: AtomicBool::new(false),
            sequence: AtomicU32::new(0),
            bind_type: config.bind_type,
            enquire_link: config.enquire_link,
            read_timeout: config.read_timeout,
        })
    }
}

/// One gateway's bound SMPP session(s) and everything around them.
pub struct Session<E: ProtocolEngine> {
    shared: Arc<Shared>,
    dispatcher: Arc<EventDispatcher>,
    shutdown: ShutdownCoordinator,
    supervisor: ConnectionSupervisor<E>,
    sessions: Mutex<RoleSessions<E::Session>>,
    /// Set while a start is running or after one succeeded
    started: AtomicBool,
    /// Last allocated sequence number
    sequence: AtomicU32,
    bind_type: BindType,
    enquire_link: Duration,
    read_timeout: Duration,
}

impl<E: ProtocolEngine> Session<E> {
    pub fn builder(config: SessionConfig, engine: E) -> SessionBuilder<E> {
        SessionBuilder {
            config,
            engine,
            metrics: Arc::new(RecorderMetrics),
            sink: None,
        }
    }

    /// Bind the configured role(s).
    ///
    /// Fails with [`SessionError::ConnectionExhausted`] once the retry budget
    /// is spent, [`SessionError::Cancelled`] if `cancel` fires first, and
    /// [`SessionError::ShuttingDown`] if `stop()` got there first. A session
    /// binds once: calling `start` again while a start is running or after
    /// one succeeded fails with [`SessionError::AlreadyStarted`]. A failed
    /// start may be retried.
    pub async fn start(&self, cancel: CancellationToken) -> SessionResult<()> {
        if self.shutdown.is_stopping() {
            return Err(SessionError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }

        let result = self.bind(cancel).await;
        if result.is_err() {
            self.started.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn bind(&self, cancel: CancellationToken) -> SessionResult<()> {
        // Either the caller's token or stop() ends the retry loop.
        let linked = self.shutdown.token().child_token();
        let _unlink = linked.clone().drop_guard();
        tokio::spawn({
            let linked = linked.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                }
            }
        });

        let mut established = match self.supervisor.establish(&linked, &self.settings()).await {
            Err(SessionError::Cancelled) if self.shutdown.is_stopping() => {
                return Err(SessionError::ShuttingDown);
            }
            result => result?,
        };

        let late = {
            let mut sessions = self.sessions.lock();
            if self.shutdown.is_stopping() {
                true
            } else {
                *sessions = std::mem::take(&mut established);
                false
            }
        };
        if late {
            warn!(gateway = %self.shared.gateway, "stop raced start, closing new sessions");
            for (_, session) in established.drain() {
                let _ = session.close().await;
            }
            self.dispatcher.mark_unbound();
            return Err(SessionError::ShuttingDown);
        }
        Ok(())
    }

    /// Admit, track and submit one message.
    ///
    /// Waits on the rate gate first. The returned sequence number is the key
    /// of the message's [`MessageStatus`]. If the engine cannot send the PDU
    /// the message goes to the resend stream and
    /// [`SessionError::SubmitFailed`] is returned.
    pub async fn submit(&self, message: OutboundMessage) -> SessionResult<u32> {
        let work = self.shutdown.submissions().token();
        if self.shutdown.is_stopping() {
            return Err(SessionError::ShuttingDown);
        }
        let engine = self
            .sessions
            .lock()
            .transmitting()
            .ok_or(SessionError::NoTransmitter)?;

        let permit = match self.shared.rate_gate.admit(self.shutdown.token()).await {
            Err(SessionError::Cancelled) => return Err(SessionError::ShuttingDown),
            result => result?,
        };

        let sequence_number = self.next_sequence_number();
        self.shared
            .status
            .set(sequence_number, MessageStatus::queued(&message));
        self.shared
            .status
            .append_gateway_history(sequence_number, &self.shared.gateway);
        self.shared.rate_gate.hold(sequence_number, permit);

        let sent = engine.submit(sequence_number, &message).await;
        // The resend push below may wait on the stream; stop must not wait on it.
        drop(work);
        if let Err(err) = sent {
            self.dispatcher.on_submit_error(sequence_number, &err).await;
            return Err(SessionError::SubmitFailed {
                sequence_number,
                source: err,
            });
        }
        Ok(sequence_number)
    }

    /// Tear everything down. Blocks until teardown completes, including
    /// when another caller is the one driving it.
    pub async fn stop(&self) {
        if !self.shutdown.begin() {
            self.shutdown.wait_terminal().await;
            return;
        }
        info!(gateway = %self.shared.gateway, "stopping session");
        let sessions = std::mem::take(&mut *self.sessions.lock());
        self.shutdown.run(sessions).await;
        self.dispatcher.mark_unbound();
    }

    /// Settings handed to the engine on every bind.
    pub fn settings(&self) -> Settings {
        Settings {
            enquire_link: self.enquire_link,
            read_timeout: self.read_timeout,
            handler: Arc::clone(&self.dispatcher),
        }
    }

    /// Delivery reports, in arrival order.
    pub fn deliveries(&self) -> Consumer<DeliveryReport> {
        self.shared.deliveries.consumer()
    }

    /// Messages whose submission failed.
    pub fn resends(&self) -> Consumer<ResendRequest> {
        self.shared.resends.consumer()
    }

    pub fn status(&self, sequence_number: u32) -> Option<MessageStatus> {
        self.shared.status.get(sequence_number)
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &E {
        self.supervisor.engine()
    }

    pub fn gateway(&self) -> &str {
        &self.shared.gateway
    }

    pub fn bind_type(&self) -> BindType {
        self.bind_type
    }

    /// When the session was constructed.
    pub fn started_at(&self) -> Instant {
        self.shared.started_at
    }

    /// Engine sessions currently held.
    pub fn bound_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Submissions awaiting submit_sm_resp (0 when the window is off).
    pub fn outstanding(&self) -> usize {
        self.shared.rate_gate.outstanding()
    }

    /// deliver_sm handlers currently running.
    pub fn pending_deliveries(&self) -> usize {
        self.shared.delivery_work.len()
    }

    pub fn shutdown_phase(&self) -> ShutdownPhase {
        self.shutdown.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }

    fn next_sequence_number(&self) -> u32 {
        let previous = self
            .sequence
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(following_sequence_number(last))
            })
            .unwrap_or_else(|last| last);
        following_sequence_number(previous)
    }
}

fn following_sequence_number(last: u32) -> u32 {
    if last >= MAX_SEQUENCE_NUMBER {
        1
    } else {
        last + 1
    }
}
