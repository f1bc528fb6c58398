//! In-flight messages.
//!
//! Every tick each message is visited once, oldest first. A message that
//! already sits on an occupied cell is delivered without moving; otherwise
//! it moves one step and is delivered if it landed on a bot. Messages that
//! are still in flight then lose one tick of lifetime.

use std::vec::Vec as StdVec;

use serde::Serialize;
use tracing::trace;

use crate::bot::{BotId, Payload};
use crate::Coord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub position: Coord,
    pub velocity: Coord,
    pub payload: Payload,
    /// Ticks of flight left; 0 never expires.
    pub ttl: u32,
}

/// The transport's view of the grid.
pub trait Recipients {
    fn occupant(&self, at: &Coord) -> Option<BotId>;
    fn deliver(&mut self, bot: BotId, payload: Payload);
}

#[derive(Debug, Default)]
pub struct Transport {
    messages: StdVec<Message>,
    next_id: u64,
}

impl Transport {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Adds a message at `at`. It first moves on the next pass.
    pub fn launch(&mut self, at: Coord, velocity: Coord, payload: Payload, ttl: u32) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.messages.push(Message {
            id,
            position: at,
            velocity,
            payload,
            ttl,
        });
        id
    }

    /// One pass over every message in launch order.
    pub fn advance<R: Recipients + ?Sized>(&mut self, recipients: &mut R) {
        let messages = std::mem::take(&mut self.messages);
        for mut message in messages {
            if let Some(bot) = recipients.occupant(&message.position) {
                trace!(message = message.id.0, %bot, at = %message.position, "delivered before moving");
                recipients.deliver(bot, message.payload);
                continue;
            }

            match message.position.offset(&message.velocity) {
                Ok(next) => message.position = next,
                Err(err) => {
                    trace!(message = message.id.0, %err, "message discarded");
                    continue;
                }
            }

            if let Some(bot) = recipients.occupant(&message.position) {
                trace!(message = message.id.0, %bot, at = %message.position, "delivered");
                recipients.deliver(bot, message.payload);
                continue;
            }

            if message.ttl > 0 {
                message.ttl = message.ttl.saturating_sub(1);
                if message.ttl == 0 {
                    trace!(message = message.id.0, at = %message.position, "expired");
                    continue;
                }
            }
            self.messages.push(message);
        }
    }
}
