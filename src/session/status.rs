// ABOUTME: Per-message status records keyed by the submit_sm sequence number
// ABOUTME: One lock over the whole table; entries live for the lifetime of the session

use crate::session::types::{MessageState, OutboundMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::SystemTime;

/// Status of one outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageStatus {
    pub created_at: SystemTime,
    /// Id the SMSC assigned in submit_sm_resp
    pub message_id: Option<String>,
    /// Application level id
    pub system_message_id: i64,
    pub sender: String,
    pub text: String,
    pub state: MessageState,
    /// Destination number
    pub number: String,
    /// Gateways the message has traversed, append-only
    pub gateway_history: Vec<String>,
}

impl MessageStatus {
    pub fn queued(message: &OutboundMessage) -> Self {
        Self {
            created_at: SystemTime::now(),
            message_id: None,
            system_message_id: message.message_id,
            sender: message.sender.clone(),
            text: message.text.clone(),
            state: MessageState::Queued,
            number: message.number.clone(),
            gateway_history: message.gateway_history.clone(),
        }
    }

    /// Rebuild the outbound message, e.g. to hand it to the resend stream.
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            message_id: self.system_message_id,
            sender: self.sender.clone(),
            number: self.number.clone(),
            text: self.text.clone(),
            gateway_history: self.gateway_history.clone(),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_sequence: HashMap<u32, MessageStatus>,
    by_message_id: HashMap<String, u32>,
}

impl Entries {
    fn index(&mut self, sequence_number: u32) {
        if let Some(id) = self
            .by_sequence
            .get(&sequence_number)
            .and_then(|status| status.message_id.clone())
        {
            self.by_message_id.insert(id, sequence_number);
        }
    }
}

/// Sequence number → [`MessageStatus`].
#[derive(Default)]
pub struct MessageStatusTable {
    entries: Mutex<Entries>,
}

impl MessageStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sequence_number: u32) -> Option<MessageStatus> {
        self.entries.lock().by_sequence.get(&sequence_number).cloned()
    }

    /// Insert or replace the entry for `sequence_number`.
    pub fn set(&self, sequence_number: u32, status: MessageStatus) {
        let mut entries = self.entries.lock();
        let stale = entries
            .by_sequence
            .insert(sequence_number, status)
            .and_then(|previous| previous.message_id);
        if let Some(id) = stale {
            if entries.by_message_id.get(&id) == Some(&sequence_number) {
                entries.by_message_id.remove(&id);
            }
        }
        entries.index(sequence_number);
    }

    /// Apply `f` to the entry in place. Returns `None` if there is no entry.
    pub fn update<R>(
        &self,
        sequence_number: u32,
        f: impl FnOnce(&mut MessageStatus) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock();
        let result = entries.by_sequence.get_mut(&sequence_number).map(f)?;
        entries.index(sequence_number);
        Some(result)
    }

    /// Record that the message went through `gateway`. Returns `false` if
    /// there is no entry.
    pub fn append_gateway_history(&self, sequence_number: u32, gateway: &str) -> bool {
        self.update(sequence_number, |status| {
            status.gateway_history.push(gateway.to_string())
        })
        .is_some()
    }

    /// Sequence number of the submission the SMSC knows as `message_id`.
    pub fn find_by_message_id(&self, message_id: &str) -> Option<u32> {
        self.entries.lock().by_message_id.get(message_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::CommandStatus;
    use std::sync::Arc;

    fn status(id: i64) -> MessageStatus {
        MessageStatus::queued(&OutboundMessage::new(id, "SENDER", "966500000000", "hi"))
    }

    #[test]
    fn test_set_get() {
        let table = MessageStatusTable::new();
        assert!(table.get(1).is_none());
        table.set(1, status(10));
        let got = table.get(1).unwrap();
        assert_eq!(got.system_message_id, 10);
        assert_eq!(got.state, MessageState::Queued);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_gateway_history_is_appended_in_order() {
        let table = MessageStatusTable::new();
        table.set(1, status(10));
        assert!(table.append_gateway_history(1, "zain"));
        assert!(table.append_gateway_history(1, "stc"));
        assert!(!table.append_gateway_history(2, "stc"));
        assert_eq!(table.get(1).unwrap().gateway_history, vec!["zain", "stc"]);
    }

    #[test]
    fn test_update_indexes_message_id() {
        let table = MessageStatusTable::new();
        table.set(5, status(50));
        table.update(5, |s| {
            s.message_id = Some("abc".to_string());
            s.state = MessageState::Submitted;
        });
        assert_eq!(table.find_by_message_id("abc"), Some(5));
        assert_eq!(table.find_by_message_id("nope"), None);
        assert_eq!(table.update(6, |s| s.state = MessageState::Failed), None);
    }

    #[test]
    fn test_reused_sequence_drops_old_message_id() {
        let table = MessageStatusTable::new();
        table.set(7, status(70));
        table.update(7, |s| s.message_id = Some("old".to_string()));

        table.set(7, status(71));
        assert_eq!(table.find_by_message_id("old"), None);
        assert_eq!(table.get(7).unwrap().system_message_id, 71);

        // A message id moved to another sequence stays indexed there.
        table.set(8, status(80));
        table.update(8, |s| s.message_id = Some("shared".to_string()));
        table.update(7, |s| s.message_id = Some("shared".to_string()));
        table.set(8, status(81));
        assert_eq!(table.find_by_message_id("shared"), Some(7));
    }

    #[test]
    fn test_concurrent_updates_of_distinct_sequences() {
        let table = Arc::new(MessageStatusTable::new());
        for seq in 0..64 {
            table.set(seq, status(seq as i64));
        }

        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for seq in (worker..64).step_by(8) {
                        table.update(seq, |s| {
                            s.state = MessageState::Rejected(CommandStatus::ThrottlingError)
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for seq in 0..64 {
            assert_eq!(
                table.get(seq).unwrap().state,
                MessageState::Rejected(CommandStatus::ThrottlingError)
            );
        }
    }
}
