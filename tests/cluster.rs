mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use paxos_log::{CommitResult, InstanceId, MemoryStorage, Node, NodeId, Replica, Shared};

use common::Recorder;

struct Cluster {
    shared: Shared,
    nodes: Vec<Arc<Node>>,
    recorders: Vec<Recorder>,
}

impl Cluster {
    fn start(size: u64) -> Self {
        let shared = Shared::new();
        let ids = (1..=size).collect::<Vec<NodeId>>();
        let mut nodes = Vec::new();
        let mut recorders = Vec::new();
        for id in &ids {
            let storage = Arc::new(MemoryStorage::new());
            let node = Arc::new(Node::start(common::config(*id, ids.clone()), storage.clone()).unwrap());
            shared.write().connect_peer(*id, node.clone());

            let recorder = Recorder::default();
            let replica = Replica::new(node.clone(), storage, shared.clone(), recorder.clone()).unwrap();
            tokio::spawn(replica.run());

            nodes.push(node);
            recorders.push(recorder);
        }
        Cluster { shared, nodes, recorders }
    }

    fn node(&self, id: NodeId) -> Arc<Node> {
        self.nodes[(id - 1) as usize].clone()
    }

    fn recorder(&self, id: NodeId) -> &Recorder {
        &self.recorders[(id - 1) as usize]
    }

    /// Waits until each of `ids` has applied at least `count` values.
    async fn converge(&self, ids: &[NodeId], count: usize) {
        for _ in 0..1000 {
            if ids.iter().all(|id| self.recorder(*id).len() >= count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("nodes {:?} did not apply {} values", ids, count);
    }
}

/// Proposes `value` until it is chosen somewhere.
async fn commit(node: &Node, value: Vec<u8>) -> InstanceId {
    loop {
        match node.propose(value.clone()).await.unwrap() {
        | (instance_id, CommitResult::Ok) => return instance_id,
        | (_, CommitResult::Conflict) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_nodes_replicate_in_order() {
    common::init_logger();
    let cluster = Cluster::start(3);
    let node = cluster.node(1);

    assert_eq!(commit(&node, b"a".to_vec()).await, 0);
    assert_eq!(commit(&node, b"b".to_vec()).await, 1);
    assert_eq!(commit(&node, b"c".to_vec()).await, 2);

    cluster.converge(&[1, 2, 3], 3).await;
    let expected = vec![(0, b"a".to_vec()), (1, b"b".to_vec()), (2, b"c".to_vec())];
    for id in 1..=3 {
        assert_eq!(cluster.recorder(id).values()[..3].to_vec(), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_proposers_converge() {
    common::init_logger();
    let cluster = Cluster::start(3);

    let mut tasks = Vec::new();
    for id in 1..=3 {
        let node = cluster.node(id);
        tasks.push(tokio::spawn(async move {
            let mut chosen = Vec::new();
            for round in 0..3 {
                let value = format!("{}-{}", id, round).into_bytes();
                chosen.push((commit(&node, value.clone()).await, value));
            }
            chosen
        }));
    }

    let mut chosen = Vec::new();
    for task in tasks {
        chosen.extend(task.await.unwrap());
    }
    chosen.sort();

    let max = chosen.iter().map(|(instance_id, _)| *instance_id).max().unwrap() as usize;
    cluster.converge(&[1, 2, 3], max + 1).await;

    let applied = cluster.recorder(1).values();
    assert_eq!(cluster.recorder(2).values()[..=max].to_vec(), applied[..=max].to_vec());
    assert_eq!(cluster.recorder(3).values()[..=max].to_vec(), applied[..=max].to_vec());
    for (instance_id, value) in chosen {
        assert_eq!(applied[instance_id as usize], (instance_id, value));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitioned_node_catches_up() {
    common::init_logger();
    let cluster = Cluster::start(3);
    cluster.shared.write().isolate(3);

    let node = cluster.node(1);
    for round in 0..4 {
        commit(&node, format!("v{}", round).into_bytes()).await;
    }
    cluster.converge(&[1, 2], 4).await;
    assert_eq!(cluster.recorder(3).len(), 0);

    cluster.shared.write().recover();
    cluster.converge(&[3], 4).await;
    assert_eq!(cluster.recorder(3).values()[..4].to_vec(), cluster.recorder(1).values()[..4].to_vec());
}
