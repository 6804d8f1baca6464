#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Once};

use hashbrown::HashSet as Set;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use paxos_log::{ChosenValue, CommitResult, Config, Instance, InstanceId, MemoryStorage, Message, NodeId, State, Storage};

static LOGGER: Once = Once::new();

/// Installs a stderr logger at the `RUST_LOG` level, `warn` by default.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(log::LevelFilter::Warn);
        let _ = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!("[{}][{}] {}", record.level(), record.target(), message))
            })
            .level(level)
            .chain(std::io::stderr())
            .apply();
    });
}

pub fn config(node_id: NodeId, node_ids: Vec<NodeId>) -> Config {
    Config::new(node_id, node_ids)
        .with_prepare_timeout(20)
        .with_accept_timeout(20)
        .with_ask_for_learn_timeout(10)
        .with_restart_prepare_timeout(3)
        .with_restart_accept_timeout(3)
}

/// State machine that records what it was asked to apply.
#[derive(Clone, Default)]
pub struct Recorder(pub Arc<Mutex<Vec<(InstanceId, Vec<u8>)>>>);

impl Recorder {
    pub fn values(&self) -> Vec<(InstanceId, Vec<u8>)> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

impl State for Recorder {
    fn execute(&mut self, instance_id: InstanceId, value: &[u8]) {
        self.0.lock().push((instance_id, value.to_vec()));
    }
}

/// Deterministic in-memory network over sans-IO instances.
///
/// Nodes are numbered from 1. Every step persists newly settled records the
/// way a host would after a `Ready`.
pub struct Network {
    nodes: Vec<Instance<MemoryStorage>>,
    queue: VecDeque<Message>,
    blocked: Set<(NodeId, NodeId)>,
    rng: StdRng,
    reorder: bool,
    duplicate: f64,
    loss: f64,
}

impl Network {
    pub fn new(size: u64, seed: u64) -> Self {
        let ids = (1..=size).collect::<Vec<_>>();
        let nodes = ids
            .iter()
            .map(|id| Instance::new(config(*id, ids.clone()), Arc::new(MemoryStorage::new())).unwrap())
            .collect();
        Network {
            nodes,
            queue: VecDeque::new(),
            blocked: Set::new(),
            rng: StdRng::seed_from_u64(seed),
            reorder: false,
            duplicate: 0.0,
            loss: 0.0,
        }
    }

    /// Delivers queued messages in random order.
    pub fn with_reordering(mut self) -> Self {
        self.reorder = true;
        self
    }

    /// Delivers each message a second time with probability `rate`.
    pub fn with_duplication(mut self, rate: f64) -> Self {
        self.duplicate = rate;
        self
    }

    /// Drops each dequeued message with probability `rate`.
    pub fn with_loss(mut self, rate: f64) -> Self {
        self.loss = rate;
        self
    }

    pub fn node(&self, id: NodeId) -> &Instance<MemoryStorage> {
        &self.nodes[(id - 1) as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Instance<MemoryStorage> {
        &mut self.nodes[(id - 1) as usize]
    }

    pub fn ids(&self) -> Vec<NodeId> {
        (1..=self.nodes.len() as u64).collect()
    }

    pub fn isolate(&mut self, id: NodeId) {
        for other in self.ids() {
            if other != id {
                self.blocked.insert((id, other));
                self.blocked.insert((other, id));
            }
        }
    }

    /// Drops traffic from `from` to `to` only.
    pub fn block(&mut self, from: NodeId, to: NodeId) {
        self.blocked.insert((from, to));
    }

    pub fn recover(&mut self) {
        self.blocked.clear();
    }

    /// Arms a commit on `id` and starts proposing `value`.
    pub fn propose(&mut self, id: NodeId, value: &[u8]) {
        let node = self.node_mut(id);
        node.commit().new_commit(value.to_vec());
        node.propose(value.to_vec());
        self.collect(id);
    }

    pub fn result(&self, id: NodeId) -> Option<(InstanceId, CommitResult)> {
        self.node(id).commit().try_result().map(|result| result.unwrap())
    }

    pub fn tick(&mut self) {
        for id in self.ids() {
            self.node_mut(id).tick();
            self.collect(id);
        }
    }

    /// Delivers every message currently queued, plus whatever they trigger,
    /// up to `limit` deliveries.
    pub fn deliver(&mut self, limit: usize) {
        for _ in 0..limit {
            if self.queue.is_empty() {
                return;
            }
            let index = if self.reorder {
                self.rng.gen_range(0..self.queue.len())
            } else {
                0
            };
            let message = match self.queue.remove(index) {
            | Some(message) => message,
            | None => return,
            };
            if self.loss > 0.0 && self.rng.gen_bool(self.loss) {
                log::trace!("[NETWORK]: lost {:?} from {} to {}", message.kind(), message.from, message.to);
                continue;
            }
            if self.duplicate > 0.0 && self.rng.gen_bool(self.duplicate) {
                self.queue.push_back(message.clone());
            }
            let to = message.to;
            self.node_mut(to).step(message).unwrap();
            self.collect(to);
        }
    }

    /// Ticks every node and drains the network, `rounds` times.
    pub fn run(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.tick();
            self.deliver(10_000);
        }
    }

    fn collect(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        let messages = node.read_messages();

        let now = node.instance_id();
        let settled = node.log().settled(now);
        if let Some(last) = settled.last().map(|value| value.instance_id) {
            node.log().storage().append(&settled).unwrap();
            node.log_mut().stable_to(last);
        }

        for message in messages {
            if !self.blocked.contains(&(message.from, message.to)) {
                self.queue.push_back(message);
            }
        }
    }

    /// Durable records on `id`.
    pub fn durable(&self, id: NodeId) -> Vec<ChosenValue> {
        let storage = self.node(id).log().storage();
        match storage.min_instance_id() {
        | Ok(min) => storage.list_from(min).unwrap(),
        | Err(_) => Vec::new(),
        }
    }
}
