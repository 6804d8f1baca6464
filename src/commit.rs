//! # Summary
//!
//! Hand-off between callers proposing values and the driver task deciding
//! them.
//!
//! `CommitContext` is a single slot: at most one proposal is in flight per
//! node. The driver arms it with an instance id when the proposal starts and
//! fills in the outcome once that instance is learned. `Committer` serializes
//! callers onto the slot and retries conflicts.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::error::{Error, Result};
use crate::message::InstanceId;

const MAX_ATTEMPTS: usize = 3;

/// Outcome of one proposal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommitResult {
    /// Our value was chosen.
    Ok,
    /// Some other value was chosen for the instance we targeted.
    Conflict,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Armed { value: Vec<u8> },
    Started { value: Vec<u8>, instance_id: InstanceId },
    Done { instance_id: InstanceId, result: CommitResult },
    Stopped,
}

#[derive(Debug)]
pub struct CommitContext {
    slot: Mutex<Slot>,
    done: Notify,
}

impl Default for CommitContext {
    fn default() -> Self {
        CommitContext::new()
    }
}

impl CommitContext {
    pub fn new() -> Self {
        CommitContext {
            slot: Mutex::new(Slot::Idle),
            done: Notify::new(),
        }
    }

    /// Arms the slot with a value waiting to be proposed.
    pub fn new_commit(&self, value: Vec<u8>) {
        let mut slot = self.slot.lock();
        if let Slot::Stopped = *slot {
            return;
        }
        *slot = Slot::Armed { value };
    }

    /// Whether the slot holds a value that has not been started yet.
    pub fn is_new_commit(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Armed { .. })
    }

    /// Binds the armed value to `instance_id`.
    pub fn start_commit(&self, instance_id: InstanceId) -> bool {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Idle) {
        | Slot::Armed { value } => {
            *slot = Slot::Started { value, instance_id };
            true
        }
        | other => {
            *slot = other;
            false
        }
        }
    }

    /// Records that `learned` was chosen for `instance_id`. Ignored unless a
    /// commit was started for exactly that instance.
    pub fn set_result(&self, instance_id: InstanceId, learned: &[u8]) {
        let mut slot = self.slot.lock();
        let result = match &*slot {
        | Slot::Started { value, instance_id: started } if *started == instance_id => {
            if value.as_slice() == learned {
                CommitResult::Ok
            } else {
                CommitResult::Conflict
            }
        }
        | _ => return,
        };
        debug!("[COMMIT]: instance {} finished with {:?}", instance_id, result);
        *slot = Slot::Done { instance_id, result };
        self.done.notify_one();
    }

    /// Fails an armed or started commit as a conflict.
    pub fn abort(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Armed { .. } | Slot::Started { .. }) {
            *slot = Slot::Done {
                instance_id: 0,
                result: CommitResult::Conflict,
            };
            self.done.notify_one();
        }
    }

    /// Permanently closes the slot; current and future waiters get `Stopped`.
    pub fn stop(&self) {
        *self.slot.lock() = Slot::Stopped;
        self.done.notify_one();
    }

    /// Takes a finished result, if there is one.
    pub fn try_result(&self) -> Option<Result<(InstanceId, CommitResult)>> {
        let mut slot = self.slot.lock();
        match *slot {
        | Slot::Done { instance_id, result } => {
            *slot = Slot::Idle;
            Some(Ok((instance_id, result)))
        }
        | Slot::Stopped => Some(Err(Error::Stopped)),
        | _ => None,
        }
    }

    pub async fn wait_result(&self) -> Result<(InstanceId, CommitResult)> {
        loop {
            if let Some(result) = self.try_result() {
                return result;
            }
            self.done.notified().await;
        }
    }
}

/// Caller-facing side of the commit slot.
pub struct Committer {
    context: Arc<CommitContext>,
    propose_tx: mpsc::UnboundedSender<Vec<u8>>,
    serial: tokio::sync::Mutex<()>,
}

impl Committer {
    pub fn new(context: Arc<CommitContext>, propose_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Committer {
            context,
            propose_tx,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    /// Proposes `value` until it is chosen or three attempts have conflicted.
    ///
    /// Returns the instance `value` was chosen for, or `(0, Conflict)`.
    pub async fn propose(&self, value: Vec<u8>) -> Result<(InstanceId, CommitResult)> {
        let _serial = self.serial.lock().await;
        for attempt in 1..=MAX_ATTEMPTS {
            self.context.new_commit(value.clone());
            self.propose_tx
                .send(value.clone())
                .map_err(|_| Error::Stopped)?;
            match self.context.wait_result().await? {
            | (instance_id, CommitResult::Ok) => return Ok((instance_id, CommitResult::Ok)),
            | (instance_id, CommitResult::Conflict) => {
                debug!("[COMMIT]: attempt {} lost instance {}", attempt, instance_id);
            }
            }
        }
        Ok((0, CommitResult::Conflict))
    }
}
