//! # Summary
//!
//! This module defines the `Learner`, which decides when the current instance
//! is settled and helps lagging peers catch up.
//!
//! A value is learned either from a `ProposerSendSuccess` that matches what
//! the local acceptor accepted, or from a batch of settled records sent by a
//! peer in answer to `AskForLearn`.

use crate::config::Config;
use crate::error::Result;
use crate::message::{Ballot, Body, ChosenValue, InstanceId, NodeId};
use crate::role::{self, Acceptor, Outbox};
use crate::storage::{Log, Storage};

pub struct Learner {
    config: Config,

    instance_id: InstanceId,

    /// Highest instance any peer has asked about
    highest_seen_instance_id: InstanceId,

    learned_value: Option<Vec<u8>>,

    learned: bool,

    ask_elapsed: u64,

    ask_timeout: u64,

    outbox: Outbox,
}

impl Learner {
    pub fn new(config: &Config) -> Self {
        Learner {
            config: config.clone(),
            instance_id: 0,
            highest_seen_instance_id: 0,
            learned_value: None,
            learned: false,
            ask_elapsed: 0,
            ask_timeout: role::randomized(config.ask_for_learn_timeout()),
            outbox: Outbox::new(config),
        }
    }

    /// Tells every node that `proposal_id` won `instance_id`.
    pub fn propose_success(&mut self, instance_id: InstanceId, proposal_id: u64) {
        self.outbox.broadcast(instance_id, Body::ProposerSendSuccess { proposal_id });
    }

    pub fn on_proposer_send_success(
        &mut self,
        from: NodeId,
        instance_id: InstanceId,
        proposal_id: u64,
        acceptor: &Acceptor,
    ) {
        if instance_id != self.instance_id {
            trace!("[LEARNER]: success for instance {} while at {}", instance_id, self.instance_id);
            return;
        }
        if acceptor.accepted().is_empty() {
            debug!("[LEARNER]: success for instance {} but nothing accepted", instance_id);
            return;
        }
        if acceptor.accepted() != Ballot::new(proposal_id, from) {
            debug!(
                "[LEARNER]: success for {} but accepted {}",
                Ballot::new(proposal_id, from),
                acceptor.accepted(),
            );
            return;
        }
        if let Some(value) = acceptor.accepted_value() {
            self.learn(value.to_vec());
        }
    }

    pub fn tick(&mut self) {
        self.ask_elapsed += 1;
        if self.ask_elapsed >= self.ask_timeout {
            trace!("[LEARNER]: asking peers about instance {}", self.instance_id);
            self.outbox.broadcast(self.instance_id, Body::AskForLearn);
            self.ask_elapsed = 0;
            self.ask_timeout = role::randomized(self.config.ask_for_learn_timeout());
        }
    }

    /// Answers a peer sitting at an older instance with every settled record
    /// from its instance up to ours.
    pub fn on_ask_for_learn<S: Storage>(&mut self, from: NodeId, instance_id: InstanceId, log: &Log<S>) -> Result<()> {
        if from == self.config.node_id() {
            return Ok(());
        }
        if instance_id > self.highest_seen_instance_id {
            self.highest_seen_instance_id = instance_id;
        }
        if instance_id >= self.instance_id {
            return Ok(());
        }

        let values = match log.list_settled_from(instance_id, self.instance_id) {
        | Ok(values) => values,
        | Err(error) if error.is_not_found() => {
            debug!("[LEARNER]: nothing settled from instance {} for {}", instance_id, from);
            return Ok(());
        }
        | Err(error) => return Err(error),
        };

        info!(
            "[LEARNER]: sending {} settled records from instance {} to {}",
            values.len(),
            instance_id,
            from,
        );
        self.outbox.send(from, instance_id, Body::SendLearnValue { values });
        Ok(())
    }

    /// Merges a batch of settled records. Returns the highest instance id in
    /// the batch, or the local instance id if the batch was ignored.
    pub fn on_send_learn_value<S: Storage>(
        &mut self,
        from: NodeId,
        instance_id: InstanceId,
        values: &[ChosenValue],
        log: &mut Log<S>,
    ) -> Result<InstanceId> {
        if instance_id > self.instance_id {
            debug!(
                "[LEARNER]: batch from {} starts at {} past local instance {}",
                from, instance_id, self.instance_id,
            );
            return Ok(self.instance_id);
        }
        let max = match values.iter().map(|value| value.instance_id).max() {
        | Some(max) => max,
        | None => return Ok(self.instance_id),
        };

        if let Some(record) = values.iter().find(|value| !value.has_value()) {
            debug!(
                "[LEARNER]: dropping batch from {} with no value for instance {}",
                from, record.instance_id,
            );
            return Ok(self.instance_id);
        }

        log.maybe_append(values, self.instance_id)?;

        if max < self.instance_id {
            debug!("[LEARNER]: ignoring stale batch from {}", from);
            return Ok(max);
        }

        let learned = match values.iter().find(|value| value.instance_id == self.instance_id) {
        | Some(record) => record.accepted_value.clone(),
        | None => log.read(self.instance_id).ok().and_then(|record| record.accepted_value),
        };

        match learned {
        | Some(value) => {
            info!(
                "[LEARNER]: learned instances {} through {} from {}",
                self.instance_id, max, from,
            );
            self.learn(value);
        }
        | None => debug!("[LEARNER]: batch from {} has no value for instance {}", from, self.instance_id),
        }
        Ok(max)
    }

    fn learn(&mut self, value: Vec<u8>) {
        self.learned_value = Some(value);
        self.learned = true;
    }

    /// Whether no peer has been seen more than one instance ahead.
    pub fn has_latest_instance_id(&self) -> bool {
        self.instance_id + 1 >= self.highest_seen_instance_id
    }

    pub fn new_instance(&mut self) {
        self.instance_id += 1;
        self.learned_value = None;
        self.learned = false;
    }

    pub fn is_learned(&self) -> bool {
        self.learned
    }

    pub fn learned_value(&self) -> Option<&[u8]> {
        self.learned_value.as_deref()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn set_instance_id(&mut self, instance_id: InstanceId) {
        self.instance_id = instance_id;
    }

    pub fn highest_seen_instance_id(&self) -> InstanceId {
        self.highest_seen_instance_id
    }

    pub fn ask_for_learn_timeout(&self) -> u64 {
        self.ask_timeout
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}
