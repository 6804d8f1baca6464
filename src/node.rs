//! # Summary
//!
//! `Node` runs an `Instance` on a single background task and talks to the
//! host through channels.
//!
//! The host feeds ticks and inbound messages, and consumes `Ready` batches:
//! settled records to persist and messages to send. Only one `Ready` is ever
//! outstanding. The driver computes the next one only after the host calls
//! `advance`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::commit::{CommitResult, Committer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::message::{ChosenValue, InstanceId, Message, NodeId};
use crate::storage::Storage;

const TICK_CAPACITY: usize = 128;

/// Batch of work handed from the driver to the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ready {
    /// Current instance, if it changed since the previous `Ready`
    pub instance_id: Option<InstanceId>,

    /// Settled records the host must persist before calling `advance`
    pub chosen_values: Vec<ChosenValue>,

    /// Messages the host must deliver
    pub messages: Vec<Message>,
}

impl Ready {
    fn new<S: Storage>(instance: &Instance<S>, previous: Option<InstanceId>) -> Self {
        let now = instance.instance_id();
        Ready {
            instance_id: if previous == Some(now) { None } else { Some(now) },
            chosen_values: instance.log().settled(now),
            messages: instance.messages(),
        }
    }

    pub fn contains_update(&self) -> bool {
        self.instance_id.is_some() || !self.chosen_values.is_empty() || !self.messages.is_empty()
    }
}

/// Handle to a running Paxos node.
pub struct Node {
    node_id: NodeId,
    tick_tx: mpsc::Sender<()>,
    step_tx: mpsc::UnboundedSender<Message>,
    advance_tx: mpsc::UnboundedSender<()>,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<Ready>>,
    committer: Committer,
}

impl Node {
    /// Recovers from `storage` and spawns the driver task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S: Storage>(config: Config, storage: Arc<S>) -> Result<Node> {
        let node_id = config.node_id();
        let instance = Instance::new(config, storage)?;

        let (tick_tx, tick_rx) = mpsc::channel(TICK_CAPACITY);
        let (step_tx, step_rx) = mpsc::unbounded_channel();
        let (propose_tx, propose_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (advance_tx, advance_rx) = mpsc::unbounded_channel();

        let committer = Committer::new(instance.commit().clone(), propose_tx);

        info!("[NODE]: starting node {} at instance {}", node_id, instance.instance_id());

        let driver = Driver {
            instance,
            tick_rx,
            step_rx,
            propose_rx,
            ready_tx,
            advance_rx,
        };
        tokio::spawn(driver.run());

        Ok(Node {
            node_id,
            tick_tx,
            step_tx,
            advance_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            committer,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Advances logical time by one tick. Dropped if the driver is behind.
    pub fn tick(&self) {
        if let Err(TrySendError::Full(_)) = self.tick_tx.try_send(()) {
            trace!("[NODE]: tick queue full, dropping tick");
        }
    }

    /// Queues an inbound message.
    pub fn step(&self, message: Message) -> Result<()> {
        self.step_tx.send(message).map_err(|_| Error::Stopped)
    }

    /// Proposes `value` and waits until it is chosen or has lost three times.
    pub async fn propose(&self, value: Vec<u8>) -> Result<(InstanceId, CommitResult)> {
        self.committer.propose(value).await
    }

    /// Blocking form of `propose` for callers outside the runtime. Must not
    /// be called from a runtime worker thread.
    pub fn propose_blocking(&self, value: Vec<u8>) -> Result<(InstanceId, CommitResult)> {
        futures::executor::block_on(self.propose(value))
    }

    /// Next batch of work, or `None` once the driver has stopped.
    pub async fn ready(&self) -> Option<Ready> {
        self.ready_rx.lock().await.recv().await
    }

    /// Acknowledges the last `Ready`: its records are durable and its
    /// messages are on their way.
    pub fn advance(&self) -> Result<()> {
        self.advance_tx.send(()).map_err(|_| Error::Stopped)
    }
}

struct Driver<S> {
    instance: Instance<S>,
    tick_rx: mpsc::Receiver<()>,
    step_rx: mpsc::UnboundedReceiver<Message>,
    propose_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ready_tx: mpsc::Sender<Ready>,
    advance_rx: mpsc::UnboundedReceiver<()>,
}

impl<S: Storage> Driver<S> {
    async fn run(mut self) {
        let mut previous: Option<InstanceId> = None;
        let mut surfaced: Option<InstanceId> = None;
        let mut awaiting_advance = false;

        loop {
            let ready = if awaiting_advance {
                None
            } else {
                Some(Ready::new(&self.instance, previous)).filter(Ready::contains_update)
            };
            let has_ready = ready.is_some();

            let result = tokio::select! {
                Some(()) = self.tick_rx.recv() => {
                    self.instance.tick();
                    Ok(())
                }
                Some(value) = self.propose_rx.recv() => {
                    self.instance.propose(value);
                    Ok(())
                }
                Some(message) = self.step_rx.recv() => {
                    self.instance.step(message)
                }
                permit = self.ready_tx.reserve(), if has_ready => {
                    let permit = match permit {
                    | Ok(permit) => permit,
                    | Err(_) => break,
                    };
                    if let Some(ready) = ready {
                        if let Some(last) = ready.chosen_values.last() {
                            surfaced = Some(last.instance_id);
                        }
                        previous = Some(self.instance.instance_id());
                        self.instance.clear_messages();
                        awaiting_advance = true;
                        permit.send(ready);
                    }
                    Ok(())
                }
                Some(()) = self.advance_rx.recv(), if awaiting_advance => {
                    if let Some(last) = surfaced.take() {
                        self.instance.log_mut().stable_to(last);
                    }
                    awaiting_advance = false;
                    Ok(())
                }
                else => break,
            };

            match result {
            | Ok(()) => (),
            | Err(error) if error.is_not_found() => {
                debug!("[NODE]: {}", error);
            }
            | Err(error) => {
                error!("[NODE]: node {} stopping: {}", self.instance.config().node_id(), error);
                break;
            }
            }
        }

        debug!("[NODE]: driver for node {} exited", self.instance.config().node_id());
        self.instance.commit().stop();
    }
}
