//! Delivery receipt text carried in the short_message of a deliver_sm.
//!
//! SMSCs format receipts as space separated `key:value` pairs, e.g.
//!
//! ```text
//! id:0123456789 sub:001 dlvrd:001 submit date:2401011200 done date:2401011201 stat:DELIVRD err:000 text:Hello
//! ```
//!
//! `text:` is always last and may itself contain spaces and colons.

/// Final state reported by a delivery receipt `stat:` field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReceiptState {
    Delivered,
    Expired,
    Deleted,
    Undeliverable,
    Accepted,
    Rejected,
    Enroute,
    Unknown,
}

impl ReceiptState {
    fn parse(stat: &str) -> Self {
        match stat.to_ascii_uppercase().as_str() {
            "DELIVRD" => ReceiptState::Delivered,
            "EXPIRED" => ReceiptState::Expired,
            "DELETED" => ReceiptState::Deleted,
            "UNDELIV" => ReceiptState::Undeliverable,
            "ACCEPTD" => ReceiptState::Accepted,
            "REJECTD" => ReceiptState::Rejected,
            "ENROUTE" => ReceiptState::Enroute,
            _ => ReceiptState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptState::Delivered => "DELIVRD",
            ReceiptState::Expired => "EXPIRED",
            ReceiptState::Deleted => "DELETED",
            ReceiptState::Undeliverable => "UNDELIV",
            ReceiptState::Accepted => "ACCEPTD",
            ReceiptState::Rejected => "REJECTD",
            ReceiptState::Enroute => "ENROUTE",
            ReceiptState::Unknown => "UNKNOWN",
        }
    }
}

/// Parsed delivery receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Message id the SMSC assigned in submit_sm_resp.
    pub message_id: String,
    pub state: ReceiptState,
    pub error_code: Option<String>,
    pub text: String,
}

impl DeliveryReceipt {
    /// Parses receipt text. Returns `None` when there is no `id:` field,
    /// which is how mobile originated messages are told apart from receipts
    /// when the esm_class bit is not trusted.
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, text) = match raw.find("text:") {
            Some(at) => (&raw[..at], raw[at + "text:".len()..].to_string()),
            None => (raw, String::new()),
        };

        let mut message_id = None;
        let mut state = ReceiptState::Unknown;
        let mut error_code = None;

        for field in head.split_whitespace() {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "id" => message_id = Some(value.to_string()),
                "stat" => state = ReceiptState::parse(value),
                "err" => error_code = Some(value.to_string()),
                _ => {}
            }
        }

        Some(DeliveryReceipt {
            message_id: message_id.filter(|id| !id.is_empty())?,
            state,
            error_code,
            text,
        })
    }
}
