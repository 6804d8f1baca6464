mod common;

use hashbrown::HashMap as Map;
use pretty_assertions::assert_eq;

use paxos_log::{Ballot, CommitResult, InstanceId};

use common::Network;

/// Checks that every durable record for an instance carries the same value
/// on every node, and returns the agreed values.
fn agreed(network: &Network) -> Map<InstanceId, Vec<u8>> {
    let mut agreed = Map::new();
    for id in network.ids() {
        let mut expected = None;
        for record in network.durable(id) {
            if let Some(next) = expected {
                assert_eq!(record.instance_id, next, "gap in node {}", id);
            }
            expected = Some(record.instance_id + 1);

            let value = record.accepted_value.clone().expect("durable record without a value");
            match agreed.get(&record.instance_id) {
            | Some(previous) => assert_eq!(previous, &value, "instance {} diverged on node {}", record.instance_id, id),
            | None => {
                agreed.insert(record.instance_id, value);
            }
            }
        }
    }
    agreed
}

fn contend(seed: u64, duplication: f64, loss: f64) {
    let mut network = Network::new(3, seed)
        .with_reordering()
        .with_duplication(duplication)
        .with_loss(loss);
    let mut promises = vec![Ballot::EMPTY; 3];
    let mut accepted = vec![(0, Ballot::EMPTY); 3];
    let mut sequence = vec![0; 3];
    let mut committed = Vec::new();

    for id in network.ids() {
        network.propose(id, format!("{}-0", id).as_bytes());
    }

    for _ in 0..500 {
        network.run(1);
        for id in network.ids() {
            let index = (id - 1) as usize;

            let promise = network.node(id).acceptor().promise();
            assert!(promise >= promises[index], "promise of node {} went backwards", id);
            promises[index] = promise;

            let node = network.node(id);
            let current = (node.instance_id(), node.acceptor().accepted());
            if current.0 == accepted[index].0 {
                assert!(current.1 >= accepted[index].1, "accepted ballot of node {} went backwards", id);
            }
            accepted[index] = current;

            if let Some((instance_id, result)) = network.result(id) {
                if result == CommitResult::Ok {
                    committed.push((instance_id, format!("{}-{}", id, sequence[index]).into_bytes()));
                }
                sequence[index] += 1;
                network.propose(id, format!("{}-{}", id, sequence[index]).as_bytes());
            }
        }
    }

    let agreed = agreed(&network);
    assert!(!agreed.is_empty(), "no progress with seed {}", seed);
    for (instance_id, value) in committed {
        if let Some(chosen) = agreed.get(&instance_id) {
            assert_eq!(chosen, &value, "commit reported for instance {} does not match", instance_id);
        }
    }
}

#[test]
fn concurrent_proposers_agree_under_reordering() {
    common::init_logger();
    for seed in 0..4 {
        contend(seed, 0.0, 0.0);
    }
}

#[test]
fn concurrent_proposers_agree_under_duplication() {
    common::init_logger();
    for seed in 10..14 {
        contend(seed, 0.2, 0.0);
    }
}

#[test]
fn concurrent_proposers_agree_under_loss() {
    common::init_logger();
    for seed in 20..24 {
        contend(seed, 0.0, 0.2);
    }
}

#[test]
fn single_proposer_fills_log_in_order() {
    common::init_logger();
    let mut network = Network::new(3, 7);
    for round in 0..5 {
        let value = format!("v{}", round);
        network.propose(1, value.as_bytes());
        network.run(1);
        assert_eq!(network.result(1), Some((round, CommitResult::Ok)));
    }

    network.run(50);
    let agreed = agreed(&network);
    for round in 0..5 {
        assert_eq!(agreed[&round], format!("v{}", round).into_bytes());
    }
}
