//! # Summary
//!
//! `Replica` is the host side of a `Node`: it supplies ticks, persists every
//! `Ready`, applies newly durable records to a `State`, and routes messages.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::message::InstanceId;
use crate::node::{Node, Ready};
use crate::state::{State, Transport};
use crate::storage::Storage;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

pub struct Replica<T, St, S> {
    node: Arc<Node>,
    storage: Arc<S>,
    transport: T,
    state: St,

    /// Next instance to apply to `state`
    next: InstanceId,

    tick_interval: Duration,
}

impl<T: Transport, St: State, S: Storage> Replica<T, St, S> {
    /// `state` is assumed to be empty: every record in `storage` is applied
    /// to it on the first instance change.
    pub fn new(node: Arc<Node>, storage: Arc<S>, transport: T, state: St) -> Result<Self> {
        let next = match storage.min_instance_id() {
        | Ok(min) => min,
        | Err(error) if error.is_not_found() => 0,
        | Err(error) => return Err(error),
        };
        Ok(Replica {
            node,
            storage,
            transport,
            state,
            next,
            tick_interval: DEFAULT_TICK_INTERVAL,
        })
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs until the node stops, then hands back the state machine.
    pub async fn run(mut self) -> Result<St> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.node.tick(),
                ready = self.node.ready() => {
                    let ready = match ready {
                    | Some(ready) => ready,
                    | None => break,
                    };
                    match self.respond_ready(ready) {
                    | Ok(()) => (),
                    | Err(Error::Stopped) => break,
                    | Err(error) => return Err(error),
                    }
                }
            }
        }
        debug!("[REPLICA]: node {} stopped at instance {}", self.node.node_id(), self.next);
        Ok(self.state)
    }

    fn respond_ready(&mut self, ready: Ready) -> Result<()> {
        let Ready { instance_id, chosen_values, messages } = ready;

        self.storage.append(&chosen_values)?;
        if instance_id.is_some() {
            self.apply()?;
        }

        let node_id = self.node.node_id();
        for message in messages {
            if message.to == node_id {
                self.node.step(message)?;
            } else {
                self.transport.send(message);
            }
        }
        self.node.advance()
    }

    fn apply(&mut self) -> Result<()> {
        let max = match self.storage.max_instance_id() {
        | Ok(max) if max >= self.next => max,
        | Ok(_) => return Ok(()),
        | Err(error) if error.is_not_found() => return Ok(()),
        | Err(error) => return Err(error),
        };
        for record in self.storage.list(self.next, max + 1)? {
            match &record.accepted_value {
            | Some(value) => self.state.execute(record.instance_id, value),
            | None => error!("[REPLICA]: instance {} is durable without a value", record.instance_id),
            }
        }
        info!("[REPLICA]: node {} applied instances {} through {}", self.node.node_id(), self.next, max);
        self.next = max + 1;
        Ok(())
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn state(&self) -> &St {
        &self.state
    }
}
