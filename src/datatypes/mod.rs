mod command_id;
mod command_status;
mod delivery_receipt;

pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use delivery_receipt::{DeliveryReceipt, ReceiptState};
