//! # Summary
//!
//! In-process message hub connecting the nodes of a local cluster.
//!
//! Every replica holds a clone of the same `Shared` and uses it as its
//! `Transport`. Links can be cut to simulate partitions.

use std::sync::Arc;

use hashbrown::{HashMap as Map, HashSet as Set};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::message::{Message, NodeId};
use crate::node::Node;
use crate::state::Transport;

#[derive(Clone, Default)]
pub struct Shared(Arc<RwLock<Hub>>);

impl Shared {
    pub fn new() -> Self {
        Shared::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Hub> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Hub> {
        self.0.write()
    }
}

impl Transport for Shared {
    fn send(&self, message: Message) {
        self.read().send(message)
    }
}

#[derive(Default)]
pub struct Hub {
    peers: Map<NodeId, Arc<Node>>,

    /// Directed links that currently drop traffic
    cut: Set<(NodeId, NodeId)>,

    /// Nodes cut off from everyone
    isolated: Set<NodeId>,
}

impl Hub {
    pub fn connect_peer(&mut self, id: NodeId, node: Arc<Node>) {
        self.peers.insert(id, node);
    }

    pub fn disconnect_peer(&mut self, id: NodeId) {
        self.peers.remove(&id);
    }

    pub fn peer(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.peers.get(&id)
    }

    /// Drops traffic between `a` and `b` in both directions.
    pub fn cut(&mut self, a: NodeId, b: NodeId) {
        self.cut.insert((a, b));
        self.cut.insert((b, a));
    }

    /// Drops all traffic to and from `id`.
    pub fn isolate(&mut self, id: NodeId) {
        self.isolated.insert(id);
    }

    /// Heals every partition.
    pub fn recover(&mut self) {
        self.cut.clear();
        self.isolated.clear();
    }

    pub fn is_blocked(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return false;
        }
        self.isolated.contains(&from) || self.isolated.contains(&to) || self.cut.contains(&(from, to))
    }

    pub fn send(&self, message: Message) {
        if self.is_blocked(message.from, message.to) {
            trace!("[SHARED]: dropping {:?} from {} to {}", message.kind(), message.from, message.to);
            return;
        }
        match self.peers.get(&message.to) {
        | Some(node) => {
            let to = message.to;
            if node.step(message).is_err() {
                debug!("[SHARED]: node {} has stopped", to);
            }
        }
        | None => trace!("[SHARED]: no peer {}", message.to),
        }
    }

    pub fn broadcast(&self, message: Message) {
        for id in self.peers.keys() {
            self.send(message.to(*id));
        }
    }
}
