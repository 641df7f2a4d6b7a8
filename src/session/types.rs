// ABOUTME: Supporting types for gateway sessions: bind roles, credentials and message records
// ABOUTME: Outbound messages go in, delivery reports and resend requests come out

use crate::datatypes::{CommandStatus, ReceiptState};
use std::time::SystemTime;

/// Type of SMPP bind a session holds with the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    /// Bind as transmitter (can send submit_sm)
    Transmitter,
    /// Bind as receiver (can receive deliver_sm)
    Receiver,
    /// Bind as transceiver (both transmitter and receiver capabilities)
    Transceiver,
}

impl BindType {
    /// Engine sessions a configured role expands to. Anything but a
    /// transceiver binds a receiver and transmitter pair.
    pub fn roles(self) -> &'static [BindType] {
        match self {
            BindType::Transceiver => &[BindType::Transceiver],
            BindType::Receiver | BindType::Transmitter => {
                &[BindType::Receiver, BindType::Transmitter]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BindType::Transmitter => "transmitter",
            BindType::Receiver => "receiver",
            BindType::Transceiver => "transceiver",
        }
    }
}

/// Credentials the engine presents in every bind
#[derive(Debug, Clone)]
pub struct BindCredentials {
    /// SMSC address, `host:port`
    pub smsc: String,
    /// System identifier for authentication
    pub system_id: String,
    /// Password for authentication
    pub password: String,
    /// System type (optional, defaults to empty string)
    pub system_type: Option<String>,
}

impl BindCredentials {
    pub fn new(
        smsc: impl Into<String>,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            smsc: smsc.into(),
            system_id: system_id.into(),
            password: password.into(),
            system_type: None,
        }
    }

    /// Set system type
    pub fn with_system_type(mut self, system_type: impl Into<String>) -> Self {
        self.system_type = Some(system_type.into());
        self
    }
}

/// A message the application wants submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Application level id, opaque to the gateway
    pub message_id: i64,
    pub sender: String,
    /// Destination number
    pub number: String,
    pub text: String,
    /// Gateways this message already went through, oldest first
    pub gateway_history: Vec<String>,
}

impl OutboundMessage {
    pub fn new(
        message_id: i64,
        sender: impl Into<String>,
        number: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            sender: sender.into(),
            number: number.into(),
            text: text.into(),
            gateway_history: Vec::new(),
        }
    }

    pub fn with_gateway_history(mut self, history: Vec<String>) -> Self {
        self.gateway_history = history;
        self
    }
}

/// Where a tracked message currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Admitted and handed to the engine, no submit_sm_resp yet
    Queued,
    /// submit_sm_resp with status OK
    Submitted,
    /// submit_sm_resp with an error status
    Rejected(CommandStatus),
    /// The engine could not send the submit_sm at all
    Failed,
    /// A delivery receipt arrived for the message
    Receipt(ReceiptState),
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Queued => "QUEUED",
            MessageState::Submitted => "SUBMITTED",
            MessageState::Rejected(_) => "REJECTED",
            MessageState::Failed => "FAILED",
            MessageState::Receipt(state) => state.as_str(),
        }
    }
}

/// Inbound deliver_sm, as pushed to the delivery stream and written to the
/// response sink.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub sequence_number: u32,
    /// SMSC message id from the receipt, `None` for mobile originated messages
    pub message_id: Option<String>,
    /// Application id of the submission the receipt correlates to, if known
    pub application_id: Option<i64>,
    pub sender: String,
    pub destination: String,
    /// Receipt state, `None` for mobile originated messages
    pub state: Option<ReceiptState>,
    pub text: String,
    pub gateway: String,
    pub received_at: SystemTime,
}

impl DeliveryReport {
    pub fn is_receipt(&self) -> bool {
        self.state.is_some()
    }
}

/// Why a message was pushed to the resend stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResendReason {
    /// submit_sm_resp carried this error status
    Rejected(CommandStatus),
    /// The engine failed to send the PDU
    SubmitError(String),
    /// The connection closed before submit_sm_resp arrived
    Unacknowledged,
}

/// A message whose submission failed and may be reattempted, possibly via
/// another gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ResendRequest {
    pub sequence_number: u32,
    pub message: OutboundMessage,
    pub reason: ResendReason,
}
