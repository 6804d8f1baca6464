//! # Summary
//!
//! The three Paxos roles hosted by every node. Roles are plain synchronous
//! state machines: they react to one message or tick at a time and queue
//! their replies in an `Outbox` for the driver to collect.

use rand::Rng;

use crate::config::Config;
use crate::message::{Body, InstanceId, Message, NodeId};

pub mod acceptor;
pub mod learner;
pub mod proposer;

pub use self::acceptor::Acceptor;
pub use self::learner::Learner;
pub use self::proposer::Proposer;

/// Messages a role has produced that the driver has not yet collected.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    node_id: NodeId,
    node_ids: Vec<NodeId>,
    messages: Vec<Message>,
}

impl Outbox {
    pub fn new(config: &Config) -> Self {
        Outbox {
            node_id: config.node_id(),
            node_ids: config.node_ids().to_vec(),
            messages: Vec::new(),
        }
    }

    pub fn send(&mut self, to: NodeId, instance_id: InstanceId, body: Body) {
        self.messages.push(Message::new(self.node_id, to, instance_id, body));
    }

    /// Queues a copy of `body` for every cluster member, this node included.
    pub fn broadcast(&mut self, instance_id: InstanceId, body: Body) {
        for &to in &self.node_ids {
            self.messages.push(Message::new(self.node_id, to, instance_id, body.clone()));
        }
    }

    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::replace(&mut self.messages, Vec::new())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Uniform draw from `[timeout / 2, timeout / 2 + timeout)`.
pub(crate) fn randomized(timeout: u64) -> u64 {
    timeout / 2 + rand::thread_rng().gen_range(0..timeout.max(1))
}
