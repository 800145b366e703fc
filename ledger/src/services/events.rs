//! Event Stream
//!
//! Fans committed ledger messages out to subscribers (indexers, the CLI).
//! The store's event log stays the source of truth; a lagging subscriber
//! drops messages rather than slowing commits down.
//!
//! # Architecture
//! ```text
//! ┌──────────────┐  publish   ┌──────────────┐     ┌─────────────────┐
//! │ InMemoryLedger│──────────▶│   EventHub   │────▶│ all messages    │
//! │  (commit,    │  (under    │              │     ├─────────────────┤
//! │   write lock)│   lock)    │              │────▶│ per-address     │
//! └──────────────┘            └──────────────┘     └─────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::db::{ContractRecord, EventRecord};
use crate::error::LedgerResult;
use crate::types::AccountId;

/// Buffered messages per channel before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 1000;
const ADDRESS_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerMessage {
    ContractDeployed(ContractRecord),
    ValueAdded(EventRecord),
}

/// Broadcast hub for ledger messages
pub struct EventHub {
    all_tx: broadcast::Sender<LedgerMessage>,
    address_channels: Mutex<HashMap<AccountId, broadcast::Sender<LedgerMessage>>>,
}

impl EventHub {
    pub fn new() -> Self {
        let (all_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            all_tx,
            address_channels: Mutex::new(HashMap::new()),
        }
    }

    /// Send to every subscriber; never blocks
    pub fn publish(&self, message: LedgerMessage) {
        if let LedgerMessage::ValueAdded(record) = &message {
            let mut channels = self
                .address_channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let address = record.event.address;
            if let Some(tx) = channels.get(&address) {
                if tx.send(message.clone()).is_err() {
                    // every receiver for this address is gone
                    channels.remove(&address);
                }
            }
        }
        // No receivers is not an error
        let _ = self.all_tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerMessage> {
        self.all_tx.subscribe()
    }

    /// Only `ValueAdded` messages minting into `address`
    ///
    /// A channel is removed on the first publish after its last receiver drops.
    pub fn subscribe_address(&self, address: &AccountId) -> broadcast::Receiver<LedgerMessage> {
        let mut channels = self
            .address_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        channels
            .entry(*address)
            .or_insert_with(|| broadcast::channel(ADDRESS_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.all_tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire form of a message
pub fn serialize_message(message: &LedgerMessage) -> LedgerResult<String> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddValueEvent;
    use capped_value_circuits::AddValue;

    fn record(sequence: u64, address: u8, value: u64) -> EventRecord {
        EventRecord {
            sequence,
            contract: AccountId::from_bytes([0xcc; 32]),
            event: AddValueEvent {
                add_value: AddValue::new(value, 1000),
                address: AccountId::from_bytes([address; 32]),
            },
        }
    }

    #[tokio::test]
    async fn test_hub_creation() {
        let hub = EventHub::new();
        assert_eq!(hub.subscriber_count(), 0);

        let _rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_in_order() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.publish(LedgerMessage::ValueAdded(record(0, 1, 300)));
        hub.publish(LedgerMessage::ValueAdded(record(1, 2, 400)));

        for expected in 0..2 {
            match rx.recv().await {
                Ok(LedgerMessage::ValueAdded(received)) => {
                    assert_eq!(received.sequence, expected)
                }
                other => panic!("Expected ValueAdded message, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_address_subscription() {
        let hub = EventHub::new();
        let watched = AccountId::from_bytes([1; 32]);
        let mut rx = hub.subscribe_address(&watched);

        hub.publish(LedgerMessage::ValueAdded(record(0, 2, 400)));
        hub.publish(LedgerMessage::ValueAdded(record(1, 1, 300)));

        match rx.recv().await {
            Ok(LedgerMessage::ValueAdded(received)) => {
                assert_eq!(received.event.address, watched);
                assert_eq!(received.event.add_value.value, 300);
            }
            other => panic!("Expected ValueAdded message, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_address_channel_pruned() {
        let hub = EventHub::new();
        let watched = AccountId::from_bytes([1; 32]);
        let rx = hub.subscribe_address(&watched);
        let other = hub.subscribe_address(&AccountId::from_bytes([2; 32]));
        assert_eq!(hub.address_channels.lock().unwrap().len(), 2);

        drop(rx);
        hub.publish(LedgerMessage::ValueAdded(record(0, 1, 300)));

        let channels = hub.address_channels.lock().unwrap();
        assert_eq!(channels.len(), 1);
        assert!(!channels.contains_key(&watched));
        drop(channels);
        drop(other);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = EventHub::default();
        hub.publish(LedgerMessage::ValueAdded(record(0, 1, 1)));

        // late subscribers only see what comes after them
        let mut rx = hub.subscribe();
        hub.publish(LedgerMessage::ValueAdded(record(1, 1, 2)));
        let received = tokio_test::block_on(rx.recv());
        tokio_test::assert_ok!(&received);
        assert!(matches!(received, Ok(LedgerMessage::ValueAdded(r)) if r.sequence == 1));
    }

    #[test]
    fn test_message_shape() {
        let json = serialize_message(&LedgerMessage::ValueAdded(record(3, 1, 5))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "ValueAdded");
        assert_eq!(value["data"]["sequence"], 3);
        assert_eq!(value["data"]["event"]["add_value"]["value"], 5);
    }
}
