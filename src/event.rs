//! Protocol events delivered by the engine and the responses returned to it.
//!
//! The engine decodes PDUs off the wire and hands each one to the session as
//! an [`Event`]. The session answers with a [`Dispatch`], which tells the
//! engine whether to write a response PDU and whether the bound session
//! should terminate.

use crate::datatypes::{CommandId, CommandStatus};
use bytes::Bytes;

/// esm_class bit 2: the deliver_sm carries an SMSC delivery receipt.
const ESM_CLASS_DELIVERY_RECEIPT: u8 = 0b0000_0100;

/// A decoded inbound PDU.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    BindResp {
        sequence_number: u32,
        command_status: CommandStatus,
    },
    Unbind {
        sequence_number: u32,
    },
    UnbindResp {
        sequence_number: u32,
    },
    SubmitSmResp(SubmitSmResp),
    GenericNack {
        sequence_number: u32,
        command_status: CommandStatus,
    },
    EnquireLinkResp {
        sequence_number: u32,
    },
    EnquireLink {
        sequence_number: u32,
    },
    DataSm {
        sequence_number: u32,
    },
    DeliverSm(DeliverSm),
    /// Any command id the session has no handling for.
    Unknown {
        command_id: u32,
        sequence_number: u32,
    },
}

impl Event {
    /// Sequence number from the PDU header. Correlates responses with the
    /// requests that caused them.
    pub fn sequence_number(&self) -> u32 {
        match self {
            Event::BindResp { sequence_number, .. }
            | Event::Unbind { sequence_number }
            | Event::UnbindResp { sequence_number }
            | Event::GenericNack { sequence_number, .. }
            | Event::EnquireLinkResp { sequence_number }
            | Event::EnquireLink { sequence_number }
            | Event::DataSm { sequence_number }
            | Event::Unknown { sequence_number, .. } => *sequence_number,
            Event::SubmitSmResp(resp) => resp.sequence_number,
            Event::DeliverSm(deliver) => deliver.sequence_number,
        }
    }

    /// The header command id. `None` for unknown events whose raw id has no
    /// [`CommandId`] variant.
    pub fn command_id(&self) -> Option<CommandId> {
        match self {
            // Which bind was answered is the engine's business.
            Event::BindResp { .. } => Some(CommandId::BindTransceiverResp),
            Event::Unbind { .. } => Some(CommandId::Unbind),
            Event::UnbindResp { .. } => Some(CommandId::UnbindResp),
            Event::SubmitSmResp(_) => Some(CommandId::SubmitSmResp),
            Event::GenericNack { .. } => Some(CommandId::GenericNack),
            Event::EnquireLinkResp { .. } => Some(CommandId::EnquireLinkResp),
            Event::EnquireLink { .. } => Some(CommandId::EnquireLink),
            Event::DataSm { .. } => Some(CommandId::DataSm),
            Event::DeliverSm(_) => Some(CommandId::DeliverSm),
            Event::Unknown { command_id, .. } => CommandId::try_from(*command_id).ok(),
        }
    }
}

/// submit_sm_resp as seen by the session.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResp {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    /// Id assigned by the SMSC. Empty when the submission was rejected.
    pub message_id: String,
}

/// deliver_sm as seen by the session: mobile originated messages and
/// delivery receipts.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSm {
    pub sequence_number: u32,
    pub source_addr: String,
    pub destination_addr: String,
    pub esm_class: u8,
    pub short_message: Bytes,
}

impl DeliverSm {
    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & ESM_CLASS_DELIVERY_RECEIPT != 0
    }

    /// Short message decoded as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.short_message).into_owned()
    }
}

/// Response PDU the engine writes back for a request event.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl Response {
    /// Successful response to `event`, `None` when the event is itself a
    /// response or has no known command id.
    pub fn to(event: &Event) -> Option<Response> {
        let command_id = event.command_id()?.response()?;
        Some(Response {
            command_id,
            command_status: CommandStatus::Ok,
            sequence_number: event.sequence_number(),
        })
    }
}

/// Result of dispatching one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dispatch {
    pub response: Option<Response>,
    /// The peer asked to unbind; the engine should close the bound session
    /// after writing the response.
    pub unbind: bool,
}

impl Dispatch {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn respond(response: Option<Response>) -> Self {
        Dispatch {
            response,
            unbind: false,
        }
    }

    pub fn terminate(response: Option<Response>) -> Self {
        Dispatch {
            response,
            unbind: true,
        }
    }
}

/// Why the engine closed a bound session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CloseState {
    /// `close()` was called by the session.
    ExplicitClosed,
    /// The peer sent unbind.
    UnbindClosing,
    /// Socket error or read timeout.
    ConnectionIssue,
    /// Undecodable data on the wire.
    InvalidStreaming,
}
