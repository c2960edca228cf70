//! The `Message` record (§3) and its type/flag vocabulary.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bitflags::bitflags;
use chrono::{DateTime, Utc}; // §3.2 convention: chrono DateTime<Utc> for all timestamps
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::ids::{ActorId, MessageId};

/// Message type tag (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Fire-and-forget message; no reply expected.
    Async,
    /// A synchronous request awaiting a [`MessageKind::SyncReply`].
    SyncRequest,
    /// The reply to a [`MessageKind::SyncRequest`].
    SyncReply,
    /// Broadcast to every live actor named by the sender's recipient list.
    Broadcast,
    /// Kernel-originated control message (e.g. interrupt-origin).
    System,
}

bitflags! {
    /// Per-message flags. Reserved for future wire-compatible extension;
    /// no bit is currently interpreted by the core beyond being carried
    /// through delivery unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MessageFlags: u8 {
        /// No flags set.
        const NONE = 0;
    }
}

/// Upper bound on a message payload, in bytes (§3, §6).
pub const MAX_PAYLOAD: usize = 4 * 1024;

/// An immutable-after-send message record (§3).
///
/// Once delivered to a mailbox, the recipient owns the message until
/// [`MessagePool::free`]; the payload buffer is released with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Pool-assigned id, monotonically increasing.
    pub id: MessageId,
    /// The sending actor.
    pub sender: ActorId,
    /// The recipient actor, or `ActorId::KERNEL` reused as the broadcast
    /// marker is *not* used here: broadcast recipients are expanded by
    /// the caller into one message per recipient before the pool ever
    /// sees them (§4.A "each recipient receives its own independent
    /// message").
    pub recipient: ActorId,
    /// Message type tag.
    pub kind: MessageKind,
    /// Routing/scheduling priority, reusing the actor priority scale.
    pub priority: crate::actor::Priority,
    /// Reserved flag bits, carried through unchanged.
    pub flags: MessageFlags,
    /// Owned payload, bounded to [`MAX_PAYLOAD`] bytes.
    pub payload: Vec<u8>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Deadline; `None` means no deadline (§3 "0 ⇒ none").
    pub deadline: Option<DateTime<Utc>>,
    /// The actor a synchronous reply should be routed to.
    pub reply_to: Option<ActorId>,
    /// Whether a reply is required of the recipient.
    pub requires_reply: bool,
}

impl Message {
    /// The size in bytes this message occupies in the pool's accounting.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Priority;

    fn sample() -> Message {
        Message {
            id: MessageId::from_raw(1),
            sender: ActorId::from_index(1),
            recipient: ActorId::from_index(2),
            kind: MessageKind::Async,
            priority: Priority::Normal,
            flags: MessageFlags::NONE,
            payload: b"hi".to_vec(),
            timestamp: Utc::now(),
            deadline: None,
            reply_to: None,
            requires_reply: false,
        }
    }

    #[test]
    fn payload_len_matches_buffer() {
        let message = sample();
        assert_eq!(message.payload_len(), 2);
    }

    #[test]
    fn deadline_none_means_no_deadline() {
        let message = sample();
        assert!(message.deadline.is_none());
    }
}
