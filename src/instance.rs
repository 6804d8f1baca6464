//! # Summary
//!
//! `Instance` is the sans-IO core of a node: one acceptor, proposer and
//! learner sharing a log, all positioned at the same Paxos instance.
//!
//! Callers feed it messages, ticks and proposals, and collect outbound
//! messages with `read_messages`. It never blocks and never touches the
//! network, so it can be driven directly by tests or wrapped by `Node`.

use std::sync::Arc;

use crate::commit::CommitContext;
use crate::config::Config;
use crate::error::Result;
use crate::message::{Body, InstanceId, Message, NodeId};
use crate::role::{Acceptor, Learner, Proposer};
use crate::storage::{Log, Storage};

pub struct Instance<S> {
    config: Config,
    acceptor: Acceptor,
    proposer: Proposer,
    learner: Learner,
    log: Log<S>,
    commit: Arc<CommitContext>,
}

impl<S: Storage> Instance<S> {
    pub fn new(config: Config, storage: Arc<S>) -> Result<Self> {
        config.validate()?;
        let log = Log::new(storage)?;

        // The acceptor owns the recovered instance id and promise.
        let mut acceptor = Acceptor::new(&config);
        acceptor.init(&log)?;

        let mut learner = Learner::new(&config);
        learner.set_instance_id(acceptor.instance_id());

        let mut proposer = Proposer::new(&config);
        proposer.set_instance_id(acceptor.instance_id());
        proposer.set_proposal_id(acceptor.promise().proposal_id + 1);

        Ok(Instance {
            config,
            acceptor,
            proposer,
            learner,
            log,
            commit: Arc::new(CommitContext::new()),
        })
    }

    /// Starts the armed commit, if any.
    pub fn propose(&mut self, value: Vec<u8>) {
        if !self.commit.is_new_commit() {
            trace!("[INSTANCE]: no armed commit, dropping proposal");
            return;
        }
        if !self.learner.has_latest_instance_id() {
            debug!(
                "[INSTANCE]: at instance {} behind peer instance {}, refusing proposal",
                self.learner.instance_id(),
                self.learner.highest_seen_instance_id(),
            );
            self.commit.abort();
            return;
        }
        self.commit.start_commit(self.proposer.instance_id());
        self.proposer.propose(value);
    }

    pub fn tick(&mut self) {
        self.proposer.tick();
        self.learner.tick();
    }

    pub fn step(&mut self, message: Message) -> Result<()> {
        trace!(
            "[INSTANCE]: node {} at {} received {:?} for instance {} from {}",
            self.config.node_id(),
            self.acceptor.instance_id(),
            message.kind(),
            message.instance_id,
            message.from,
        );

        let Message { from, instance_id, body, .. } = message;
        match body {
        | Body::Prepare { proposal_id } => self.step_acceptor(from, instance_id, proposal_id, None),
        | Body::Accept { proposal_id, value } => self.step_acceptor(from, instance_id, proposal_id, Some(value)),
        | Body::PrepareReply { proposal_id, pre_accept, value, reject } => {
            if instance_id == self.proposer.instance_id() {
                self.proposer.on_prepare_reply(from, proposal_id, pre_accept, value, reject);
            }
            Ok(())
        }
        | Body::AcceptReply { proposal_id, reject } => {
            if instance_id == self.proposer.instance_id() {
                if let Some(winner) = self.proposer.on_accept_reply(from, proposal_id, reject) {
                    self.learner.propose_success(self.proposer.instance_id(), winner);
                }
            }
            Ok(())
        }
        | Body::AskForLearn => {
            self.learner.on_ask_for_learn(from, instance_id, &self.log)?;
            self.after_learn(None);
            Ok(())
        }
        | Body::SendLearnValue { values } => {
            let max = self.learner.on_send_learn_value(from, instance_id, &values, &mut self.log)?;
            self.after_learn(Some(max));
            Ok(())
        }
        | Body::ProposerSendSuccess { proposal_id } => {
            self.learner.on_proposer_send_success(from, instance_id, proposal_id, &self.acceptor);
            self.after_learn(None);
            Ok(())
        }
        }
    }

    fn step_acceptor(
        &mut self,
        from: NodeId,
        instance_id: InstanceId,
        proposal_id: u64,
        value: Option<Vec<u8>>,
    ) -> Result<()> {
        let current = self.acceptor.instance_id();
        if instance_id == current + 1 {
            // The sender has already moved past our instance, so the ballot
            // it used here must have won.
            self.learner.on_proposer_send_success(from, current, proposal_id, &self.acceptor);
            self.after_learn(None);
            Ok(())
        } else if instance_id == current {
            match value {
            | None => self.acceptor.on_prepare(from, proposal_id, &mut self.log),
            | Some(value) => self.acceptor.on_accept(from, proposal_id, &value, &mut self.log),
            }
        } else {
            trace!("[INSTANCE]: dropping message for instance {} at {}", instance_id, current);
            Ok(())
        }
    }

    /// Reports a freshly learned value to the commit slot and moves on. A
    /// learned batch advances through every instance it covers.
    fn after_learn(&mut self, batch_max: Option<InstanceId>) {
        if !self.learner.is_learned() {
            return;
        }
        let learned = self.learner.learned_value().unwrap_or_default();
        self.commit.set_result(self.learner.instance_id(), learned);
        self.proposer.settle(learned);
        match batch_max {
        | Some(max) => {
            while self.learner.instance_id() <= max {
                self.new_instance();
            }
        }
        | None => self.new_instance(),
        }
        info!(
            "[INSTANCE]: node {} starting instance {}",
            self.config.node_id(),
            self.acceptor.instance_id(),
        );
    }

    fn new_instance(&mut self) {
        self.acceptor.new_instance();
        self.learner.new_instance();
        self.proposer.new_instance();
    }

    /// Drains queued outbound messages.
    pub fn read_messages(&mut self) -> Vec<Message> {
        let mut messages = self.proposer.outbox_mut().drain();
        messages.extend(self.acceptor.outbox_mut().drain());
        messages.extend(self.learner.outbox_mut().drain());
        messages
    }

    /// Copies queued outbound messages without draining them.
    pub fn messages(&self) -> Vec<Message> {
        self.proposer
            .outbox()
            .messages()
            .iter()
            .chain(self.acceptor.outbox().messages())
            .chain(self.learner.outbox().messages())
            .cloned()
            .collect()
    }

    pub fn clear_messages(&mut self) {
        self.proposer.outbox_mut().clear();
        self.acceptor.outbox_mut().clear();
        self.learner.outbox_mut().clear();
    }

    /// Instance currently being decided.
    pub fn instance_id(&self) -> InstanceId {
        self.acceptor.instance_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &Log<S> {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut Log<S> {
        &mut self.log
    }

    pub fn commit(&self) -> &Arc<CommitContext> {
        &self.commit
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    pub fn proposer(&self) -> &Proposer {
        &self.proposer
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }
}
