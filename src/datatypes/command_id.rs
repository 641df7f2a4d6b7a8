use num_enum::TryFromPrimitive;

/// The command_id field of the PDU header identifies the operation.
///
/// Response ids carry bit 31 set (`0x8000_0000`) on top of the request id.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    GenericNack = 0x8000_0000,
    BindReceiver = 0x0000_0001,
    BindReceiverResp = 0x8000_0001,
    BindTransmitter = 0x0000_0002,
    BindTransmitterResp = 0x8000_0002,
    SubmitSm = 0x0000_0004,
    SubmitSmResp = 0x8000_0004,
    DeliverSm = 0x0000_0005,
    DeliverSmResp = 0x8000_0005,
    Unbind = 0x0000_0006,
    UnbindResp = 0x8000_0006,
    BindTransceiver = 0x0000_0009,
    BindTransceiverResp = 0x8000_0009,
    EnquireLink = 0x0000_0015,
    EnquireLinkResp = 0x8000_0015,
    DataSm = 0x0000_0103,
    DataSmResp = 0x8000_0103,
}

impl CommandId {
    const RESPONSE_BIT: u32 = 0x8000_0000;

    /// True for `*_resp` ids and `generic_nack`.
    pub fn is_response(self) -> bool {
        self as u32 & Self::RESPONSE_BIT != 0
    }

    /// The response id paired with a request id, `None` for ids that are
    /// already responses.
    pub fn response(self) -> Option<CommandId> {
        if self.is_response() {
            return None;
        }
        CommandId::try_from(self as u32 | Self::RESPONSE_BIT).ok()
    }
}
