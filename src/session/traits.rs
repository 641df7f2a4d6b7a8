// ABOUTME: Seams to the external SMPP protocol engine and the delivery persistence sink
// ABOUTME: The engine binds, encodes and decodes; the session supplies callbacks through Settings

use crate::session::dispatcher::EventDispatcher;
use crate::session::error::EngineError;
use crate::session::types::{BindCredentials, BindType, DeliveryReport, OutboundMessage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-connection settings handed to the engine on every bind.
///
/// `handler` bundles the callbacks the engine must invoke: every decoded PDU
/// goes to [`EventDispatcher::on_event`], and send, receive, rebind and close
/// failures go to the matching `on_*` hooks.
#[derive(Clone)]
pub struct Settings {
    /// Interval between enquire_link PDUs
    pub enquire_link: Duration,
    /// Read timeout on the socket
    pub read_timeout: Duration,
    pub handler: Arc<EventDispatcher>,
}

/// One bound SMPP session owned by the engine
pub trait EngineSession: Send + Sync + 'static {
    /// Encode and send a submit_sm with the given sequence number.
    ///
    /// Returns once the PDU is written; the submit_sm_resp arrives later as
    /// an event.
    fn submit(
        &self,
        sequence_number: u32,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Unbind and close the connection.
    fn close(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Dials, binds and keeps SMPP sessions alive
pub trait ProtocolEngine: Send + Sync + 'static {
    type Session: EngineSession;

    /// Establish a session bound as `role`.
    ///
    /// After an unexpected connection loss the engine rebinds by itself every
    /// `rebind_interval`, reporting failures to `Settings::handler`.
    fn connect(
        &self,
        role: BindType,
        credentials: &BindCredentials,
        settings: Settings,
        rebind_interval: Duration,
    ) -> impl Future<Output = Result<Self::Session, EngineError>> + Send;
}

/// Downstream persistence of inbound deliveries
pub trait ResponseSink: Send + Sync {
    fn write_response(&self, report: &DeliveryReport);

    /// Flush and release the sink. Called once, at the end of shutdown.
    fn close(&self);
}
