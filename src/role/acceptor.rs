//! # Summary
//!
//! This module defines the `Acceptor`, which acts as Paxos's distributed
//! memory for the current instance. It answers prepares and accepts and
//! stages a snapshot of its state in the log after every change.

use crate::config::Config;
use crate::error::Result;
use crate::message::{Ballot, Body, ChosenValue, InstanceId, NodeId};
use crate::role::Outbox;
use crate::storage::{Log, Storage};

pub struct Acceptor {
    /// Instance this acceptor is voting in
    instance_id: InstanceId,

    /// Highest ballot promised
    promise: Ballot,

    /// Ballot of the most recently accepted value
    accepted: Ballot,

    accepted_value: Option<Vec<u8>>,

    outbox: Outbox,
}

impl Acceptor {
    pub fn new(config: &Config) -> Self {
        Acceptor {
            instance_id: 0,
            promise: Ballot::EMPTY,
            accepted: Ballot::EMPTY,
            accepted_value: None,
            outbox: Outbox::new(config),
        }
    }

    /// Resumes from the most recent durable record, or starts at instance 0
    /// on an empty store.
    pub fn init<S: Storage>(&mut self, log: &Log<S>) -> Result<()> {
        let max = match log.max_instance_id() {
        | Ok(max) => max,
        | Err(error) if error.is_not_found() => {
            info!("[ACCEPTOR]: empty storage, starting at instance 0");
            self.instance_id = 0;
            self.promise = Ballot::EMPTY;
            self.accepted = Ballot::EMPTY;
            self.accepted_value = None;
            return Ok(());
        }
        | Err(error) => return Err(error),
        };

        let record = log.read(max)?;
        self.instance_id = max;
        self.promise = record.promise;
        self.accepted = record.accepted;
        self.accepted_value = record.accepted_value;
        info!(
            "[ACCEPTOR]: resuming instance {} with promise {} and accepted {}",
            max, self.promise, self.accepted,
        );
        Ok(())
    }

    pub fn on_prepare<S: Storage>(&mut self, from: NodeId, proposal_id: u64, log: &mut Log<S>) -> Result<()> {
        let ballot = Ballot::new(proposal_id, from);
        let reply = if ballot >= self.promise {
            debug!("[ACCEPTOR]: promising {} in instance {}, previously accepted {}", ballot, self.instance_id, self.accepted);
            let value = if self.accepted.is_empty() {
                None
            } else {
                self.accepted_value.clone()
            };
            let reply = Body::PrepareReply {
                proposal_id,
                pre_accept: self.accepted,
                value,
                reject: None,
            };
            self.promise = ballot;
            self.persist(log)?;
            reply
        } else {
            debug!("[ACCEPTOR]: rejecting prepare {} under promise {}", ballot, self.promise);
            Body::PrepareReply {
                proposal_id,
                pre_accept: Ballot::EMPTY,
                value: None,
                reject: Some(self.promise.proposal_id),
            }
        };
        self.outbox.send(from, self.instance_id, reply);
        Ok(())
    }

    pub fn on_accept<S: Storage>(&mut self, from: NodeId, proposal_id: u64, value: &[u8], log: &mut Log<S>) -> Result<()> {
        let ballot = Ballot::new(proposal_id, from);
        let reject = if ballot >= self.promise {
            debug!("[ACCEPTOR]: accepting {} in instance {}", ballot, self.instance_id);
            self.promise = ballot;
            self.accepted = ballot;
            self.accepted_value = Some(value.to_vec());
            self.persist(log)?;
            None
        } else {
            debug!("[ACCEPTOR]: rejecting accept {} under promise {}", ballot, self.promise);
            Some(self.promise.proposal_id)
        };
        self.outbox.send(from, self.instance_id, Body::AcceptReply { proposal_id, reject });
        Ok(())
    }

    fn persist<S: Storage>(&self, log: &mut Log<S>) -> Result<()> {
        log.stage(ChosenValue::new(
            self.instance_id,
            self.promise,
            self.accepted,
            self.accepted_value.clone(),
        ))
    }

    /// Moves on to the next instance. The promise carries over.
    pub fn new_instance(&mut self) {
        self.instance_id += 1;
        self.accepted = Ballot::EMPTY;
        self.accepted_value = None;
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn promise(&self) -> Ballot {
        self.promise
    }

    pub fn accepted(&self) -> Ballot {
        self.accepted
    }

    pub fn accepted_value(&self) -> Option<&[u8]> {
        self.accepted_value.as_deref()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    #[cfg(test)]
    pub(crate) fn set_promise(&mut self, promise: Ballot) {
        self.promise = promise;
    }

    #[cfg(test)]
    pub(crate) fn set_accepted(&mut self, accepted: Ballot, value: &[u8]) {
        self.accepted = accepted;
        self.accepted_value = Some(value.to_vec());
    }
}
