// ABOUTME: Establishes the role-scoped engine sessions for a gateway with exponential backoff
// ABOUTME: Bounded by the retry budget and an external cancellation token checked between attempts

use crate::session::config::BackoffConfig;
use crate::session::error::{EngineError, SessionError, SessionResult};
use crate::session::traits::{EngineSession, ProtocolEngine, Settings};
use crate::session::types::{BindCredentials, BindType};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Engine sessions held for one gateway, by role.
pub struct RoleSessions<S> {
    pub transceiver: Option<Arc<S>>,
    pub receiver: Option<Arc<S>>,
    pub transmitter: Option<Arc<S>>,
}

impl<S> Default for RoleSessions<S> {
    fn default() -> Self {
        Self {
            transceiver: None,
            receiver: None,
            transmitter: None,
        }
    }
}

impl<S> RoleSessions<S> {
    fn slot(&mut self, role: BindType) -> &mut Option<Arc<S>> {
        match role {
            BindType::Transceiver => &mut self.transceiver,
            BindType::Receiver => &mut self.receiver,
            BindType::Transmitter => &mut self.transmitter,
        }
    }

    pub fn set(&mut self, role: BindType, session: S) {
        *self.slot(role) = Some(Arc::new(session));
    }

    /// The session that can carry submit_sm.
    pub fn transmitting(&self) -> Option<Arc<S>> {
        self.transceiver
            .as_ref()
            .or(self.transmitter.as_ref())
            .map(Arc::clone)
    }

    /// Take every held session out, leaving all slots empty.
    pub fn drain(&mut self) -> Vec<(BindType, Arc<S>)> {
        [BindType::Transceiver, BindType::Receiver, BindType::Transmitter]
            .into_iter()
            .filter_map(|role| self.slot(role).take().map(|session| (role, session)))
            .collect()
    }

    pub fn len(&self) -> usize {
        [&self.transceiver, &self.receiver, &self.transmitter]
            .into_iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Connects a gateway's configured role(s) through the engine.
pub struct ConnectionSupervisor<E> {
    engine: E,
    gateway: String,
    bind_type: BindType,
    credentials: BindCredentials,
    rebind_interval: Duration,
    backoff: BackoffConfig,
    max_retries: u32,
}

impl<E: ProtocolEngine> ConnectionSupervisor<E> {
    pub fn new(
        engine: E,
        gateway: impl Into<String>,
        bind_type: BindType,
        credentials: BindCredentials,
        rebind_interval: Duration,
        backoff: BackoffConfig,
        max_retries: u32,
    ) -> Self {
        Self {
            engine,
            gateway: gateway.into(),
            bind_type,
            credentials,
            rebind_interval,
            backoff,
            max_retries,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Try up to `max_retries + 1` times to bind every role.
    ///
    /// Cancellation is checked before each attempt and cuts a backoff sleep
    /// short, but never interrupts an attempt in progress. There is no sleep
    /// after the final attempt.
    pub async fn establish(
        &self,
        cancel: &CancellationToken,
        settings: &Settings,
    ) -> SessionResult<RoleSessions<E::Session>> {
        let mut retries: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                info!(gateway = %self.gateway, retries, "session creation cancelled");
                return Err(SessionError::Cancelled);
            }

            let err = match self.connect_sessions(settings).await {
                Ok(sessions) => {
                    settings.handler.mark_bound();
                    info!(
                        gateway = %self.gateway,
                        bind_type = self.bind_type.as_str(),
                        attempts = retries + 1,
                        "session established"
                    );
                    return Ok(sessions);
                }
                Err(err) => err,
            };

            error!(gateway = %self.gateway, retries, error = %err, "failed to create session");
            if retries >= self.max_retries {
                return Err(SessionError::ConnectionExhausted {
                    attempts: retries.saturating_add(1),
                    source: err,
                });
            }

            let delay = self.backoff.delay(retries);
            info!(gateway = %self.gateway, delay_ms = delay.as_millis() as u64, "retrying in (backoff)");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            retries += 1;
        }
    }

    /// One attempt. A pair that only half binds is closed again so the next
    /// attempt starts clean.
    async fn connect_sessions(
        &self,
        settings: &Settings,
    ) -> Result<RoleSessions<E::Session>, EngineError> {
        let mut sessions = RoleSessions::default();
        for &role in self.bind_type.roles() {
            match self
                .engine
                .connect(role, &self.credentials, settings.clone(), self.rebind_interval)
                .await
            {
                Ok(session) => sessions.set(role, session),
                Err(err) => {
                    for (bound, session) in sessions.drain() {
                        if let Err(close_err) = session.close().await {
                            debug!(
                                gateway = %self.gateway,
                                role = bound.as_str(),
                                error = %close_err,
                                "closing partially bound session failed"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{MockEngine, harness};

    fn supervisor(engine: MockEngine, max_retries: u32) -> ConnectionSupervisor<MockEngine> {
        ConnectionSupervisor::new(
            engine,
            "zain",
            BindType::Transceiver,
            BindCredentials::new("localhost:2775", "id", "secret"),
            Duration::from_secs(600),
            BackoffConfig::default(),
            max_retries,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries_plus_one() {
        let h = harness();
        let engine = MockEngine::always_failing();
        let log = engine.log();
        let supervisor = supervisor(engine, 2);
        let start = tokio::time::Instant::now();

        let result = supervisor.establish(&CancellationToken::new(), &h.settings()).await;

        match result {
            Err(SessionError::ConnectionExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other.map(|s| s.len())),
        }
        assert_eq!(log.attempts().len(), 3);
        // 100ms + 200ms, no sleep after the last attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
        assert_eq!(h.metrics.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let h = harness();
        let engine = MockEngine::failing_times(2);
        let log = engine.log();
        let supervisor = supervisor(engine, 5);

        let sessions = supervisor
            .establish(&CancellationToken::new(), &h.settings())
            .await
            .unwrap();

        assert_eq!(log.attempts().len(), 3);
        assert!(sessions.transceiver.is_some());
        assert_eq!(sessions.len(), 1);
        assert_eq!(h.metrics.active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let h = harness();
        let engine = MockEngine::healthy();
        let log = engine.log();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = supervisor(engine, 3).establish(&cancel, &h.settings()).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert!(log.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_attempt_lets_attempt_finish() {
        let h = harness();
        let engine = MockEngine::always_failing().with_connect_delay(Duration::from_millis(500));
        let log = engine.log();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = supervisor(engine, 10).establish(&cancel, &h.settings()).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
        // The attempt in flight when cancel fired ran to completion, no more started.
        assert_eq!(log.attempts().len(), 1);
        assert_eq!(log.completed_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_binds_receiver_and_transmitter() {
        let h = harness();
        let engine = MockEngine::healthy();
        let log = engine.log();
        let mut supervisor = supervisor(engine, 0);
        supervisor.bind_type = BindType::Receiver;

        let sessions = supervisor
            .establish(&CancellationToken::new(), &h.settings())
            .await
            .unwrap();
        assert_eq!(log.attempts(), vec![BindType::Receiver, BindType::Transmitter]);
        assert!(sessions.receiver.is_some());
        assert!(sessions.transmitter.is_some());
        assert!(sessions.transmitting().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_bound_pair_is_closed_before_retry() {
        let h = harness();
        let engine = MockEngine::healthy().failing_role(BindType::Transmitter, 1);
        let log = engine.log();
        let mut supervisor = supervisor(engine, 1);
        supervisor.bind_type = BindType::Transmitter;

        let sessions = supervisor
            .establish(&CancellationToken::new(), &h.settings())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(log.closes(), vec![BindType::Receiver]);
    }
}
