// ABOUTME: Routes protocol events from the engine to status updates, stream pushes and responses
// ABOUTME: Also implements the engine's error and close callbacks for a gateway session

use crate::datatypes::DeliveryReceipt;
use crate::event::{CloseState, DeliverSm, Dispatch, Event, Response, SubmitSmResp};
use crate::session::Shared;
use crate::session::error::EngineError;
use crate::session::stream::StreamClosed;
use crate::session::types::{DeliveryReport, MessageState, ResendReason, ResendRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Event handler registered with the engine for every bound session of a
/// gateway.
///
/// | Event | Action | Response |
/// |---|---|---|
/// | `BindResp` | none | none |
/// | `Unbind` | session closed | `unbind_resp`, terminate |
/// | `UnbindResp` | session duration observed | none |
/// | `SubmitSmResp` | status update, outstanding slot released, resend on error | none |
/// | `GenericNack` | logged | none |
/// | `EnquireLinkResp` | none | none |
/// | `EnquireLink` | none | `enquire_link_resp` |
/// | `DataSm` | none | `data_sm_resp` |
/// | `DeliverSm` | delivery report to sink and delivery stream | `deliver_sm_resp` |
/// | `Unknown` | none | none |
pub struct EventDispatcher {
    shared: Arc<Shared>,
    /// Whether the active-session gauge currently counts this gateway.
    bound: AtomicBool,
}

impl EventDispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            bound: AtomicBool::new(false),
        }
    }

    pub fn gateway(&self) -> &str {
        &self.shared.gateway
    }

    /// Handle one inbound PDU.
    pub async fn on_event(&self, event: Event) -> Dispatch {
        match &event {
            Event::BindResp { .. } => Dispatch::none(),
            Event::Unbind { sequence_number } => {
                info!(gateway = %self.shared.gateway, sequence_number, "unbind received");
                self.mark_unbound();
                Dispatch::terminate(Response::to(&event))
            }
            Event::UnbindResp { .. } => {
                self.observe_duration();
                Dispatch::none()
            }
            Event::SubmitSmResp(resp) => {
                self.handle_submit_sm_resp(resp).await;
                Dispatch::none()
            }
            Event::GenericNack {
                sequence_number,
                command_status,
            } => {
                warn!(
                    gateway = %self.shared.gateway,
                    sequence_number,
                    status = ?command_status,
                    "generic_nack received"
                );
                Dispatch::none()
            }
            Event::EnquireLinkResp { .. } => Dispatch::none(),
            Event::EnquireLink { .. } | Event::DataSm { .. } => {
                Dispatch::respond(Response::to(&event))
            }
            Event::DeliverSm(deliver) => {
                // Registered before any work so shutdown cannot see zero
                // in-flight deliveries while this handler runs.
                let _work = self.shared.delivery_work.token();
                self.handle_deliver_sm(deliver).await;
                Dispatch::respond(Response::to(&event))
            }
            Event::Unknown {
                command_id,
                sequence_number,
            } => {
                debug!(
                    gateway = %self.shared.gateway,
                    command_id = *command_id,
                    sequence_number,
                    "ignoring unknown pdu"
                );
                Dispatch::none()
            }
        }
    }

    /// The engine failed to write the submit_sm for `sequence_number`.
    pub async fn on_submit_error(&self, sequence_number: u32, err: &EngineError) {
        error!(gateway = %self.shared.gateway, sequence_number, error = %err, "submit_sm error");
        self.shared.rate_gate.release(sequence_number);

        let message = self.shared.status.update(sequence_number, |status| {
            status.state = MessageState::Failed;
            status.to_outbound()
        });
        match message {
            Some(message) => {
                self.push_resend(ResendRequest {
                    sequence_number,
                    message,
                    reason: ResendReason::SubmitError(err.to_string()),
                })
                .await
            }
            None => warn!(
                gateway = %self.shared.gateway,
                sequence_number,
                "submit error for untracked sequence number"
            ),
        }
    }

    /// Receiving a PDU failed, or the network did. The engine recovers.
    pub fn on_receive_error(&self, err: &EngineError) {
        error!(gateway = %self.shared.gateway, error = %err, "receiving pdu/network error");
    }

    pub fn on_rebind_error(&self, err: &EngineError) {
        self.observe_duration();
        error!(gateway = %self.shared.gateway, error = %err, "rebinding error");
    }

    /// A bound session closed. submit_sm_resp PDUs still owed on it will
    /// never arrive, so every submission awaiting one is failed, its
    /// outstanding slot freed and the message pushed for resend.
    pub async fn on_closed(&self, state: CloseState) {
        self.mark_unbound();
        info!(gateway = %self.shared.gateway, state = ?state, "session closed");

        for sequence_number in self.shared.rate_gate.release_all() {
            let message = self.shared.status.update(sequence_number, |status| {
                status.state = MessageState::Failed;
                status.to_outbound()
            });
            if let Some(message) = message {
                debug!(
                    gateway = %self.shared.gateway,
                    sequence_number,
                    "submit_sm unacknowledged at close"
                );
                self.push_resend(ResendRequest {
                    sequence_number,
                    message,
                    reason: ResendReason::Unacknowledged,
                })
                .await;
            }
        }
    }

    /// Count this gateway as an active session. Repeated calls count once.
    pub(crate) fn mark_bound(&self) {
        if !self.bound.swap(true, Ordering::SeqCst) {
            self.shared.metrics.session_opened(&self.shared.gateway);
        }
    }

    /// Stop counting this gateway as active. Only the first call after
    /// [`mark_bound`](Self::mark_bound) decrements.
    pub(crate) fn mark_unbound(&self) {
        if self.bound.swap(false, Ordering::SeqCst) {
            self.shared.metrics.session_closed(&self.shared.gateway);
        }
    }

    fn observe_duration(&self) {
        self.shared
            .metrics
            .observe_session_duration(&self.shared.gateway, self.shared.started_at.elapsed());
    }

    async fn handle_submit_sm_resp(&self, resp: &SubmitSmResp) {
        let sequence_number = resp.sequence_number;
        self.shared.rate_gate.release(sequence_number);

        let rejected = self.shared.status.update(sequence_number, |status| {
            if resp.command_status.is_ok() {
                status.state = MessageState::Submitted;
                status.message_id = Some(resp.message_id.clone());
                None
            } else {
                status.state = MessageState::Rejected(resp.command_status);
                Some(status.to_outbound())
            }
        });

        match rejected {
            None => warn!(
                gateway = %self.shared.gateway,
                sequence_number,
                "submit_sm_resp for untracked sequence number"
            ),
            Some(None) => debug!(
                gateway = %self.shared.gateway,
                sequence_number,
                message_id = %resp.message_id,
                "submit_sm accepted"
            ),
            Some(Some(message)) => {
                warn!(
                    gateway = %self.shared.gateway,
                    sequence_number,
                    status = ?resp.command_status,
                    "submit_sm rejected"
                );
                self.push_resend(ResendRequest {
                    sequence_number,
                    message,
                    reason: ResendReason::Rejected(resp.command_status),
                })
                .await;
            }
        }
    }

    async fn handle_deliver_sm(&self, deliver: &DeliverSm) {
        let text = deliver.text();
        let mut report = DeliveryReport {
            sequence_number: deliver.sequence_number,
            message_id: None,
            application_id: None,
            sender: deliver.source_addr.clone(),
            destination: deliver.destination_addr.clone(),
            state: None,
            text,
            gateway: self.shared.gateway.clone(),
            received_at: SystemTime::now(),
        };

        if deliver.is_delivery_receipt() {
            match DeliveryReceipt::parse(&report.text) {
                Some(receipt) => {
                    report.application_id = self
                        .shared
                        .status
                        .find_by_message_id(&receipt.message_id)
                        .and_then(|seq| {
                            self.shared.status.update(seq, |status| {
                                status.state = MessageState::Receipt(receipt.state);
                                status.system_message_id
                            })
                        });
                    report.message_id = Some(receipt.message_id);
                    report.state = Some(receipt.state);
                }
                None => warn!(
                    gateway = %self.shared.gateway,
                    sequence_number = deliver.sequence_number,
                    "unparseable delivery receipt"
                ),
            }
        }

        if let Some(sink) = &self.shared.sink {
            sink.write_response(&report);
        }

        if let Err(StreamClosed(report)) = self.shared.deliveries.push(report).await {
            warn!(
                gateway = %self.shared.gateway,
                sequence_number = report.sequence_number,
                "delivery stream closed, dropping report"
            );
        }
    }

    /// Waits for room like any push, except once stop has begun.
    async fn push_resend(&self, request: ResendRequest) {
        let (sequence_number, message_id) = (request.sequence_number, request.message.message_id);
        tokio::select! {
            biased;
            pushed = self.shared.resends.push(request) => {
                if let Err(StreamClosed(request)) = pushed {
                    warn!(
                        gateway = %self.shared.gateway,
                        sequence_number = request.sequence_number,
                        message_id = request.message.message_id,
                        "resend stream closed, dropping message"
                    );
                }
            }
            _ = self.shared.shutdown.cancelled() => {
                warn!(
                    gateway = %self.shared.gateway,
                    sequence_number,
                    message_id,
                    "resend stream full during shutdown, dropping message"
                );
            }
        }
    }
}
