// ABOUTME: Ordered teardown of a gateway session across engine, streams, deliveries and sink
// ABOUTME: Exactly one stop() call drives the phases; concurrent callers wait for the terminal phase

use crate::session::Shared;
use crate::session::config::ShutdownConfig;
use crate::session::supervisor::RoleSessions;
use crate::session::traits::EngineSession;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// One-shot open→closed gate.
///
/// `signal` reports whether this call performed the transition, so exactly
/// one caller wins even when many race.
#[derive(Debug, Default)]
pub struct OneShotGate {
    signaled: AtomicBool,
}

impl OneShotGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> bool {
        !self.signaled.swap(true, Ordering::SeqCst)
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }
}

/// Teardown phases, entered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Normal operation
    Armed,
    /// Stop requested; waiting for in-progress submissions to unwind
    SignalReceived,
    /// Closing each engine session once
    EngineClosing,
    /// Grace period for PDUs already being handled
    DrainDelay,
    /// Delivery and resend streams closed
    StreamsClosed,
    /// Closed flag set
    ClosedFlag,
    /// Waiting for delivery handlers to finish
    DeliveryDrained,
    /// Duration recorded, sink closed
    Terminal,
}

pub struct ShutdownCoordinator {
    shared: Arc<Shared>,
    config: ShutdownConfig,
    stop_requested: OneShotGate,
    closed: OneShotGate,
    phase: watch::Sender<ShutdownPhase>,
    /// In-progress `Session::submit` calls
    submissions: TaskTracker,
}

impl ShutdownCoordinator {
    pub(crate) fn new(shared: Arc<Shared>, config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Armed);
        Self {
            shared,
            config,
            stop_requested: OneShotGate::new(),
            closed: OneShotGate::new(),
            phase,
            submissions: TaskTracker::new(),
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_requested.is_signaled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_signaled()
    }

    /// Cancelled when stop begins; ends admission waits and resend pushes.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.shared.shutdown
    }

    pub(crate) fn submissions(&self) -> &TaskTracker {
        &self.submissions
    }

    /// Claim the stop. Returns `false` if another caller already did.
    pub(crate) fn begin(&self) -> bool {
        if !self.stop_requested.signal() {
            return false;
        }
        self.shared.shutdown.cancel();
        self.shared.rate_gate.close();
        self.enter(ShutdownPhase::SignalReceived);
        true
    }

    /// Wait until the winning caller reaches [`ShutdownPhase::Terminal`].
    pub(crate) async fn wait_terminal(&self) {
        let mut phase = self.phase.subscribe();
        // The sender lives in `self`, so this only ends at Terminal.
        let _ = phase.wait_for(|p| *p == ShutdownPhase::Terminal).await;
    }

    /// Drive every phase after [`begin`](Self::begin). Nothing is retried;
    /// engine close failures are logged and ignored.
    pub(crate) async fn run<S: EngineSession>(&self, mut sessions: RoleSessions<S>) {
        let gateway = &self.shared.gateway;

        self.submissions.close();
        self.submissions.wait().await;

        self.enter(ShutdownPhase::EngineClosing);
        for (role, session) in sessions.drain() {
            if let Err(err) = session.close().await {
                debug!(gateway = %gateway, role = role.as_str(), error = %err, "ignoring close error");
            }
        }

        self.enter(ShutdownPhase::DrainDelay);
        tokio::time::sleep(self.config.drain_delay).await;

        self.enter(ShutdownPhase::StreamsClosed);
        self.shared.deliveries.close();
        self.shared.resends.close();

        self.enter(ShutdownPhase::ClosedFlag);
        self.closed.signal();

        self.enter(ShutdownPhase::DeliveryDrained);
        self.shared.delivery_work.close();
        self.shared.delivery_work.wait().await;

        self.shared
            .metrics
            .observe_session_duration(gateway, self.shared.started_at.elapsed());
        if let Some(sink) = &self.shared.sink {
            tokio::time::sleep(self.config.sink_grace).await;
            sink.close();
        }

        self.enter(ShutdownPhase::Terminal);
        info!(gateway = %gateway, "session stopped");
    }

    fn enter(&self, phase: ShutdownPhase) {
        debug!(gateway = %self.shared.gateway, phase = ?phase, "shutdown phase");
        self.phase.send_replace(phase);
    }
}
