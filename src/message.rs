//! # Summary
//!
//! Plain data carried between roles and nodes: ballots, per-instance log
//! records, and the protocol messages themselves.
//!
//! A `Message` is built in one step and never mutated afterwards. Every copy
//! queued for delivery is an owned clone, so producer and consumer never share
//! a buffer.

use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

pub type NodeId = u64;

pub type InstanceId = u64;

/// Totally ordered proposal identifier. The derived ordering compares
/// `proposal_id` first and breaks ties on `node_id`.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ballot {
    pub proposal_id: u64,
    pub node_id: NodeId,
}

impl Ballot {
    pub const EMPTY: Ballot = Ballot { proposal_id: 0, node_id: 0 };

    pub fn new(proposal_id: u64, node_id: NodeId) -> Self {
        Ballot { proposal_id, node_id }
    }

    pub fn is_empty(&self) -> bool {
        self.proposal_id == 0
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.proposal_id, self.node_id)
    }
}

/// Snapshot of one instance's acceptor state, as staged in the unstable log
/// and eventually written to storage.
#[derive(Serialize, Deserialize)]
#[derive(Derivative)]
#[derivative(Clone, Debug, PartialEq, Eq)]
pub struct ChosenValue {
    pub instance_id: InstanceId,
    pub promise: Ballot,
    pub accepted: Ballot,
    #[derivative(Debug(format_with = "fmt_optional_value"))]
    pub accepted_value: Option<Vec<u8>>,
}

impl ChosenValue {
    pub fn new(
        instance_id: InstanceId,
        promise: Ballot,
        accepted: Ballot,
        accepted_value: Option<Vec<u8>>,
    ) -> Self {
        ChosenValue {
            instance_id,
            promise,
            accepted,
            accepted_value,
        }
    }

    /// Record carrying nothing but an instance id and an empty value.
    pub fn empty(instance_id: InstanceId) -> Self {
        ChosenValue::new(instance_id, Ballot::EMPTY, Ballot::EMPTY, Some(Vec::new()))
    }

    pub fn has_value(&self) -> bool {
        self.accepted_value.is_some()
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Derivative)]
#[derivative(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Prepare {
        proposal_id: u64,
    },
    PrepareReply {
        proposal_id: u64,
        /// Ballot the replying acceptor had accepted before this promise.
        pre_accept: Ballot,
        #[derivative(Debug(format_with = "fmt_optional_value"))]
        value: Option<Vec<u8>>,
        /// Promised proposal id of the acceptor that turned us down.
        reject: Option<u64>,
    },
    Accept {
        proposal_id: u64,
        #[derivative(Debug(format_with = "fmt_value"))]
        value: Vec<u8>,
    },
    AcceptReply {
        proposal_id: u64,
        reject: Option<u64>,
    },
    AskForLearn,
    SendLearnValue {
        values: Vec<ChosenValue>,
    },
    ProposerSendSuccess {
        proposal_id: u64,
    },
}

/// Field-less discriminant of `Body`, handy for routing and filtering.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Prepare,
    PrepareReply,
    Accept,
    AcceptReply,
    AskForLearn,
    SendLearnValue,
    ProposerSendSuccess,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub from: NodeId,
    pub to: NodeId,
    pub instance_id: InstanceId,
    pub body: Body,
}

impl Message {
    pub fn new(from: NodeId, to: NodeId, instance_id: InstanceId, body: Body) -> Self {
        Message {
            from,
            to,
            instance_id,
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match &self.body {
        | Body::Prepare { .. } => MessageKind::Prepare,
        | Body::PrepareReply { .. } => MessageKind::PrepareReply,
        | Body::Accept { .. } => MessageKind::Accept,
        | Body::AcceptReply { .. } => MessageKind::AcceptReply,
        | Body::AskForLearn => MessageKind::AskForLearn,
        | Body::SendLearnValue { .. } => MessageKind::SendLearnValue,
        | Body::ProposerSendSuccess { .. } => MessageKind::ProposerSendSuccess,
        }
    }

    /// Proposal number carried by this message, if its kind has one.
    pub fn proposal_id(&self) -> Option<u64> {
        match &self.body {
        | Body::Prepare { proposal_id }
        | Body::PrepareReply { proposal_id, .. }
        | Body::Accept { proposal_id, .. }
        | Body::AcceptReply { proposal_id, .. }
        | Body::ProposerSendSuccess { proposal_id } => Some(*proposal_id),
        | Body::AskForLearn
        | Body::SendLearnValue { .. } => None,
        }
    }

    /// Same message addressed to a different node.
    pub fn to(&self, to: NodeId) -> Self {
        Message { to, ..self.clone() }
    }

    /// Serializes the message with `bincode` for hosts that frame it themselves.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn fmt_value(value: &Vec<u8>, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<{} bytes>", value.len())
}

fn fmt_optional_value(value: &Option<Vec<u8>>, f: &mut fmt::Formatter) -> fmt::Result {
    match value {
    | Some(value) => fmt_value(value, f),
    | None => write!(f, "None"),
    }
}
