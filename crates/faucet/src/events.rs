//! Faucet event fan-out.
//!
//! Events are published after a state change has been committed, from inside
//! the same critical section, so subscribers see them in commit order.

use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use tokio::sync::broadcast;
use tracing::debug;

use crate::policy::Timestamp;

/// A successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensClaimed {
    pub account: Address,
    pub amount: u128,
    pub timestamp: Timestamp,
}

/// Events emitted by the faucet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaucetEvent {
    TokensClaimed(TokensClaimed),
    PauseChanged { paused: bool, by: Address },
}

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<FaucetEvent>,
}

impl EventSubscriber {
    /// Receive next event. Returns `None` once the publisher is gone.
    /// A lagging subscriber skips the events it missed.
    pub async fn recv(&mut self) -> Option<FaucetEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<FaucetEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Event publisher for faucet events
pub struct EventPublisher {
    sender: broadcast::Sender<FaucetEvent>,
}

impl EventPublisher {
    /// Create new event publisher
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish event to all subscribers. Returns the number of receivers.
    pub fn publish(&self, event: FaucetEvent) -> usize {
        // Runs inside the claim critical section; an empty audience is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    /// Get receiver count (active subscribers)
    pub fn active_subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
