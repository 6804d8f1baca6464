//! # Summary
//!
//! Static cluster membership and timeout settings for one node.
//!
//! All timeouts are measured in ticks, i.e. calls to `Node::tick`. The host
//! decides how long a tick is.

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::NodeId;

const DEFAULT_PREPARE_TIMEOUT: u64 = 2000;
const DEFAULT_ACCEPT_TIMEOUT: u64 = 2000;
const DEFAULT_ASK_FOR_LEARN_TIMEOUT: u64 = 1000;
const DEFAULT_RESTART_PREPARE_TIMEOUT: u64 = 30;
const DEFAULT_RESTART_ACCEPT_TIMEOUT: u64 = 30;

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Unique ID of this node
    node_id: NodeId,

    /// Every node in the cluster, this one included
    node_ids: Vec<NodeId>,

    /// Ticks before an unanswered prepare round is restarted
    prepare_timeout: u64,

    /// Ticks before an unanswered accept round falls back to prepare
    accept_timeout: u64,

    /// Base interval between catch-up requests
    ask_for_learn_timeout: u64,

    /// Base backoff after a rejected prepare round
    restart_prepare_timeout: u64,

    /// Base backoff after a rejected accept round
    restart_accept_timeout: u64,
}

impl Config {
    pub fn new(node_id: NodeId, node_ids: Vec<NodeId>) -> Self {
        Config {
            node_id,
            node_ids,
            prepare_timeout: DEFAULT_PREPARE_TIMEOUT,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            ask_for_learn_timeout: DEFAULT_ASK_FOR_LEARN_TIMEOUT,
            restart_prepare_timeout: DEFAULT_RESTART_PREPARE_TIMEOUT,
            restart_accept_timeout: DEFAULT_RESTART_ACCEPT_TIMEOUT,
        }
    }

    pub fn with_prepare_timeout(mut self, ticks: u64) -> Self {
        self.prepare_timeout = ticks;
        self
    }

    pub fn with_accept_timeout(mut self, ticks: u64) -> Self {
        self.accept_timeout = ticks;
        self
    }

    pub fn with_ask_for_learn_timeout(mut self, ticks: u64) -> Self {
        self.ask_for_learn_timeout = ticks;
        self
    }

    pub fn with_restart_prepare_timeout(mut self, ticks: u64) -> Self {
        self.restart_prepare_timeout = ticks;
        self
    }

    pub fn with_restart_accept_timeout(mut self, ticks: u64) -> Self {
        self.restart_accept_timeout = ticks;
        self
    }

    /// Copy of this config as seen from another member of the same cluster.
    pub fn for_node(&self, node_id: NodeId) -> Self {
        Config { node_id, ..self.clone() }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Strict majority of the cluster.
    pub fn quorum(&self) -> usize {
        self.node_ids.len() / 2 + 1
    }

    pub fn prepare_timeout(&self) -> u64 {
        self.prepare_timeout
    }

    pub fn accept_timeout(&self) -> u64 {
        self.accept_timeout
    }

    pub fn ask_for_learn_timeout(&self) -> u64 {
        self.ask_for_learn_timeout
    }

    pub fn restart_prepare_timeout(&self) -> u64 {
        self.restart_prepare_timeout
    }

    pub fn restart_accept_timeout(&self) -> u64 {
        self.restart_accept_timeout
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_ids.is_empty() {
            return Err(Error::Config("cluster has no members".into()));
        }
        if !self.node_ids.contains(&self.node_id) {
            return Err(Error::Config(format!("node {} is not a cluster member", self.node_id)));
        }
        let mut sorted = self.node_ids.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(Error::Config("duplicate node id".into()));
        }
        let timeouts = [
            ("prepare", self.prepare_timeout),
            ("accept", self.accept_timeout),
            ("ask_for_learn", self.ask_for_learn_timeout),
            ("restart_prepare", self.restart_prepare_timeout),
            ("restart_accept", self.restart_accept_timeout),
        ];
        for (name, ticks) in timeouts.iter() {
            if *ticks == 0 {
                return Err(Error::Config(format!("{} timeout must be positive", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_strict_majority() {
        assert_eq!(Config::new(1, vec![1]).quorum(), 1);
        assert_eq!(Config::new(1, vec![1, 2]).quorum(), 2);
        assert_eq!(Config::new(1, vec![1, 2, 3]).quorum(), 2);
        assert_eq!(Config::new(1, vec![1, 2, 3, 4]).quorum(), 3);
        assert_eq!(Config::new(1, vec![1, 2, 3, 4, 5]).quorum(), 3);
    }

    #[test]
    fn defaults_and_builders() {
        let config = Config::new(2, vec![1, 2, 3]);
        assert_eq!(config.prepare_timeout(), 2000);
        assert_eq!(config.accept_timeout(), 2000);
        assert_eq!(config.ask_for_learn_timeout(), 1000);
        assert_eq!(config.restart_prepare_timeout(), 30);
        assert_eq!(config.restart_accept_timeout(), 30);

        let config = config
            .with_prepare_timeout(6)
            .with_accept_timeout(6)
            .with_ask_for_learn_timeout(3)
            .with_restart_prepare_timeout(3)
            .with_restart_accept_timeout(3);
        assert_eq!(config.prepare_timeout(), 6);
        assert_eq!(config.restart_accept_timeout(), 3);
        assert_eq!(config.for_node(3).node_id(), 3);
        assert_eq!(config.for_node(3).prepare_timeout(), 6);
    }

    #[test]
    fn validate_rejects_bad_membership() {
        assert!(Config::new(1, vec![1, 2, 3]).validate().is_ok());
        assert!(Config::new(1, vec![]).validate().is_err());
        assert!(Config::new(4, vec![1, 2, 3]).validate().is_err());
        assert!(Config::new(1, vec![1, 2, 2]).validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = Config::new(1, vec![1]).with_ask_for_learn_timeout(0);
        match config.validate() {
        | Err(Error::Config(reason)) => assert!(reason.contains("ask_for_learn")),
        | other => panic!("unexpected: {:?}", other),
        }
    }
}
