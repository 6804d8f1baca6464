//! # Summary
//!
//! This module defines the `Proposer`, which drives a value through the
//! prepare and accept phases of the current instance.
//!
//! Once a prepare round passes, later proposals skip straight to accept until
//! some acceptor rejects this node. Failed rounds back off for a randomized
//! number of ticks before retrying with a higher ballot.

use hashbrown::HashSet as Set;

use crate::config::Config;
use crate::message::{Ballot, Body, InstanceId, NodeId};
use crate::role::{self, Outbox};

/// Per-round reply bookkeeping.
#[derive(Clone, Debug)]
struct Counter {
    quorum: usize,
    count: usize,
    received: Set<NodeId>,
    passed: Set<NodeId>,
    rejected: Set<NodeId>,
}

impl Counter {
    fn new(config: &Config) -> Self {
        Counter {
            quorum: config.quorum(),
            count: config.node_count(),
            received: Set::default(),
            passed: Set::default(),
            rejected: Set::default(),
        }
    }

    fn new_round(&mut self) {
        self.received.clear();
        self.passed.clear();
        self.rejected.clear();
    }

    fn pass(&mut self, node_id: NodeId) {
        self.received.insert(node_id);
        self.passed.insert(node_id);
    }

    fn reject(&mut self, node_id: NodeId) {
        self.received.insert(node_id);
        self.rejected.insert(node_id);
    }

    fn is_passed(&self) -> bool {
        self.passed.len() >= self.quorum
    }

    fn is_rejected(&self) -> bool {
        self.rejected.len() >= self.quorum
    }

    fn is_all_received(&self) -> bool {
        self.received.len() == self.count
    }
}

pub struct Proposer {
    config: Config,

    instance_id: InstanceId,

    /// Proposal number of the current (or next) round
    proposal_id: u64,

    /// Highest promise reported by a rejecting acceptor
    highest_other_proposal_id: u64,

    /// Value being driven through this instance
    value: Option<Vec<u8>>,

    /// Highest previously accepted ballot reported during prepare
    highest_other_pre_accept: Ballot,

    counter: Counter,

    preparing: bool,
    accepting: bool,
    can_skip_prepare: bool,
    was_rejected_by_someone: bool,

    /// Whether an accept went out under `proposal_id` in this instance
    sent_accept: bool,

    /// Set once `proposal_id` won the current instance. Success is
    /// re-announced every accept timeout until the instance moves on.
    succeeded: bool,
    success_elapsed: u64,

    prepare_elapsed: u64,
    accept_elapsed: u64,
    prepare_timeout: u64,
    accept_timeout: u64,

    /// Instance the running timer was armed for
    timeout_instance_id: InstanceId,

    outbox: Outbox,
}

impl Proposer {
    pub fn new(config: &Config) -> Self {
        Proposer {
            config: config.clone(),
            instance_id: 0,
            proposal_id: 1,
            highest_other_proposal_id: 0,
            value: None,
            highest_other_pre_accept: Ballot::EMPTY,
            counter: Counter::new(config),
            preparing: false,
            accepting: false,
            can_skip_prepare: false,
            was_rejected_by_someone: false,
            sent_accept: false,
            succeeded: false,
            success_elapsed: 0,
            prepare_elapsed: 0,
            accept_elapsed: 0,
            prepare_timeout: config.prepare_timeout(),
            accept_timeout: config.accept_timeout(),
            timeout_instance_id: 0,
            outbox: Outbox::new(config),
        }
    }

    /// Starts driving `value` unless a value is already in flight.
    pub fn propose(&mut self, value: Vec<u8>) {
        if self.value.is_none() {
            self.value = Some(value);
        }
        self.prepare_timeout = self.config.prepare_timeout();
        self.accept_timeout = self.config.accept_timeout();
        if self.can_skip_prepare && !self.was_rejected_by_someone {
            debug!("[PROPOSER]: skipping prepare for instance {}", self.instance_id);
            self.accept();
        } else {
            let bump = self.was_rejected_by_someone;
            self.prepare(bump);
        }
    }

    fn prepare(&mut self, new_ballot: bool) {
        self.exit_accept();
        self.exit_success();
        self.preparing = true;
        self.can_skip_prepare = false;
        self.was_rejected_by_someone = false;
        self.highest_other_pre_accept = Ballot::EMPTY;
        // A ballot that already carried an accept cannot carry another value.
        if new_ballot || self.sent_accept {
            self.proposal_id = std::cmp::max(self.proposal_id, self.highest_other_proposal_id) + 1;
            self.sent_accept = false;
        }
        debug!(
            "[PROPOSER]: preparing instance {} with proposal {}",
            self.instance_id, self.proposal_id,
        );
        self.counter.new_round();
        self.arm_prepare_timer(None);
        self.outbox.broadcast(self.instance_id, Body::Prepare { proposal_id: self.proposal_id });
    }

    fn accept(&mut self) {
        self.exit_prepare();
        self.exit_success();
        self.accepting = true;
        self.sent_accept = true;
        self.counter.new_round();
        self.arm_accept_timer(None);
        let value = self.value.clone().unwrap_or_default();
        debug!(
            "[PROPOSER]: accepting instance {} with proposal {} ({} bytes)",
            self.instance_id,
            self.proposal_id,
            value.len(),
        );
        self.outbox.broadcast(
            self.instance_id,
            Body::Accept {
                proposal_id: self.proposal_id,
                value,
            },
        );
    }

    pub fn on_prepare_reply(
        &mut self,
        from: NodeId,
        proposal_id: u64,
        pre_accept: Ballot,
        value: Option<Vec<u8>>,
        reject: Option<u64>,
    ) {
        if !self.preparing || proposal_id != self.proposal_id {
            trace!("[PROPOSER]: dropping stale prepare reply from {}", from);
            return;
        }

        match reject {
        | None => {
            self.counter.pass(from);
            self.merge_pre_accept(pre_accept, value);
        }
        | Some(promised) => {
            debug!("[PROPOSER]: prepare {} rejected by {} promised to {}", proposal_id, from, promised);
            self.counter.reject(from);
            self.was_rejected_by_someone = true;
            self.raise_highest_other(promised);
        }
        }

        if self.counter.is_passed() {
            debug!("[PROPOSER]: prepare {} passed in instance {}", proposal_id, self.instance_id);
            self.can_skip_prepare = true;
            self.accept();
        } else if self.counter.is_rejected() || self.counter.is_all_received() {
            let timeout = role::randomized(self.config.restart_prepare_timeout());
            debug!("[PROPOSER]: prepare {} failed, retrying in {} ticks", proposal_id, timeout);
            self.arm_prepare_timer(Some(timeout));
        }
    }

    /// Returns the winning proposal id once an accept quorum is reached.
    pub fn on_accept_reply(&mut self, from: NodeId, proposal_id: u64, reject: Option<u64>) -> Option<u64> {
        if !self.accepting || proposal_id != self.proposal_id {
            trace!("[PROPOSER]: dropping stale accept reply from {}", from);
            return None;
        }

        match reject {
        | None => self.counter.pass(from),
        | Some(promised) => {
            debug!("[PROPOSER]: accept {} rejected by {} promised to {}", proposal_id, from, promised);
            self.counter.reject(from);
            self.was_rejected_by_someone = true;
            self.raise_highest_other(promised);
        }
        }

        if self.counter.is_passed() {
            debug!("[PROPOSER]: accept {} passed in instance {}", proposal_id, self.instance_id);
            self.exit_accept();
            self.succeeded = true;
            self.success_elapsed = 0;
            Some(self.proposal_id)
        } else {
            if self.counter.is_rejected() || self.counter.is_all_received() {
                let timeout = role::randomized(self.config.restart_accept_timeout());
                debug!("[PROPOSER]: accept {} failed, re-preparing in {} ticks", proposal_id, timeout);
                self.arm_accept_timer(Some(timeout));
            }
            None
        }
    }

    pub fn tick(&mut self) {
        if self.preparing {
            self.prepare_elapsed += 1;
            if self.instance_id != self.timeout_instance_id {
                self.prepare_elapsed = 0;
                return;
            }
            if self.prepare_elapsed >= self.prepare_timeout {
                self.prepare_elapsed = 0;
                debug!("[PROPOSER]: prepare timed out in instance {}", self.instance_id);
                let bump = self.was_rejected_by_someone;
                self.prepare(bump);
            }
        } else if self.accepting {
            self.accept_elapsed += 1;
            if self.instance_id != self.timeout_instance_id {
                self.accept_elapsed = 0;
                return;
            }
            if self.accept_elapsed >= self.accept_timeout {
                self.accept_elapsed = 0;
                debug!("[PROPOSER]: accept timed out in instance {}", self.instance_id);
                let bump = self.was_rejected_by_someone;
                self.prepare(bump);
            }
        } else if self.succeeded {
            self.success_elapsed += 1;
            if self.success_elapsed >= self.config.accept_timeout() {
                self.success_elapsed = 0;
                debug!(
                    "[PROPOSER]: instance {} still open, re-announcing proposal {}",
                    self.instance_id, self.proposal_id,
                );
                self.outbox.broadcast(self.instance_id, Body::ProposerSendSuccess { proposal_id: self.proposal_id });
            }
        }
    }

    /// Adopts the highest previously accepted value reported during prepare.
    fn merge_pre_accept(&mut self, ballot: Ballot, value: Option<Vec<u8>>) {
        if ballot.is_empty() {
            return;
        }
        if ballot >= self.highest_other_pre_accept {
            trace!("[PROPOSER]: adopting value accepted under {}", ballot);
            self.highest_other_pre_accept = ballot;
            if value.is_some() {
                self.value = value;
            }
        }
    }

    fn raise_highest_other(&mut self, proposal_id: u64) {
        if proposal_id > self.highest_other_proposal_id {
            self.highest_other_proposal_id = proposal_id;
        }
    }

    fn arm_prepare_timer(&mut self, timeout: Option<u64>) {
        self.prepare_elapsed = 0;
        self.prepare_timeout = timeout.unwrap_or_else(|| self.config.prepare_timeout());
        self.timeout_instance_id = self.instance_id;
    }

    fn arm_accept_timer(&mut self, timeout: Option<u64>) {
        self.accept_elapsed = 0;
        self.accept_timeout = timeout.unwrap_or_else(|| self.config.accept_timeout());
        self.timeout_instance_id = self.instance_id;
    }

    fn exit_prepare(&mut self) {
        self.preparing = false;
        self.prepare_elapsed = 0;
    }

    fn exit_accept(&mut self) {
        self.accepting = false;
        self.accept_elapsed = 0;
    }

    fn exit_success(&mut self) {
        self.succeeded = false;
        self.success_elapsed = 0;
    }

    /// Called with the value chosen for the current instance before moving
    /// on. If it is not ours, the ballot that carried our value is retired:
    /// next-instance traffic under it would otherwise vouch for a loser.
    pub fn settle(&mut self, chosen: &[u8]) {
        let lost = match &self.value {
        | Some(value) => value.as_slice() != chosen,
        | None => false,
        };
        if lost {
            self.proposal_id = std::cmp::max(self.proposal_id, self.highest_other_proposal_id) + 1;
            self.can_skip_prepare = false;
            debug!(
                "[PROPOSER]: lost instance {}, moving to proposal {}",
                self.instance_id, self.proposal_id,
            );
        }
    }

    pub fn new_instance(&mut self) {
        self.instance_id += 1;
        self.counter.new_round();
        self.highest_other_proposal_id = 0;
        self.value = None;
        self.sent_accept = false;
        self.exit_accept();
        self.exit_prepare();
        self.exit_success();
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn set_instance_id(&mut self, instance_id: InstanceId) {
        self.instance_id = instance_id;
    }

    pub fn proposal_id(&self) -> u64 {
        self.proposal_id
    }

    pub fn set_proposal_id(&mut self, proposal_id: u64) {
        self.proposal_id = proposal_id;
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn is_preparing(&self) -> bool {
        self.preparing
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn has_succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn can_skip_prepare(&self) -> bool {
        self.can_skip_prepare
    }

    pub fn was_rejected_by_someone(&self) -> bool {
        self.was_rejected_by_someone
    }

    pub fn highest_other_proposal_id(&self) -> u64 {
        self.highest_other_proposal_id
    }

    pub fn prepare_timeout(&self) -> u64 {
        self.prepare_timeout
    }

    pub fn accept_timeout(&self) -> u64 {
        self.accept_timeout
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    #[cfg(test)]
    pub(crate) fn set_can_skip_prepare(&mut self, can_skip_prepare: bool) {
        self.can_skip_prepare = can_skip_prepare;
    }

    #[cfg(test)]
    pub(crate) fn set_was_rejected_by_someone(&mut self, rejected: bool) {
        self.was_rejected_by_someone = rejected;
    }

    #[cfg(test)]
    pub(crate) fn set_highest_other_proposal_id(&mut self, proposal_id: u64) {
        self.raise_highest_other(proposal_id);
    }
}
