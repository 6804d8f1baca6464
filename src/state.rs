use crate::message::{InstanceId, Message};

/// Deterministic state machine fed by the replicated log.
pub trait State: Send + 'static {
    /// Applies the value chosen for `instance_id`. Called once per instance,
    /// in instance order.
    fn execute(&mut self, instance_id: InstanceId, value: &[u8]);
}

/// Outbound half of the network between nodes.
pub trait Transport: Send + Sync + 'static {
    /// Best-effort delivery of `message` to `message.to`.
    fn send(&self, message: Message);
}

impl State for Vec<(InstanceId, Vec<u8>)> {
    fn execute(&mut self, instance_id: InstanceId, value: &[u8]) {
        self.push((instance_id, value.to_vec()));
    }
}
