//! # Summary
//!
//! The replicated log as a single node sees it: durable storage followed by
//! the unstable buffer.
//!
//! Only the driver task touches a `Log`. The host reaches storage through its
//! own `Arc` and is expected to persist what `settled` reports before the
//! driver calls `stable_to`.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::{ChosenValue, InstanceId};
use crate::storage::{Storage, Unstable};

pub struct Log<S> {
    storage: Arc<S>,
    unstable: Unstable,
}

impl<S: Storage> Log<S> {
    pub fn new(storage: Arc<S>) -> Result<Self> {
        let unstable = Unstable::new(max_or_none(&*storage)?);
        Ok(Log { storage, unstable })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn unstable(&self) -> &Unstable {
        &self.unstable
    }

    /// Highest durable instance id; `NotFound` on an empty store.
    pub fn max_instance_id(&self) -> Result<InstanceId> {
        self.storage.max_instance_id()
    }

    /// Reads a record, preferring the unstable copy.
    pub fn read(&self, instance_id: InstanceId) -> Result<ChosenValue> {
        match self.unstable.get(instance_id)? {
        | Some(value) => Ok(value.clone()),
        | None => self.storage.get(instance_id),
        }
    }

    /// Stages an acceptor snapshot. Instances that are already durable are
    /// never re-staged.
    pub fn stage(&mut self, value: ChosenValue) -> Result<()> {
        if let Some(max) = max_or_none(&*self.storage)? {
            if value.instance_id <= max {
                trace!("[LOG]: instance {} already durable", value.instance_id);
                return Ok(());
            }
        }
        self.unstable.append(value)
    }

    /// Settled records in `[from, before)`, drawn from storage and then the
    /// unstable chosen prefix. `NotFound` if nothing starting at `from` is
    /// available.
    pub fn list_settled_from(&self, from: InstanceId, before: InstanceId) -> Result<Vec<ChosenValue>> {
        if from >= before {
            return Err(Error::not_found(from));
        }

        let mut settled = Vec::new();
        if let Some(max) = max_or_none(&*self.storage)? {
            if from <= max {
                settled = self.storage.list(from, before.min(max + 1))?;
            }
        }

        let next = settled.last().map_or(from, |value| value.instance_id + 1);
        if next < before {
            let tail: &[ChosenValue] = match self.unstable.accepted_values_from(next) {
            | Ok(tail) => tail,
            | Err(error) if error.is_not_found() => &[],
            | Err(error) => return Err(error),
            };
            if tail.first().map(|value| value.instance_id) == Some(next) {
                settled.extend(
                    tail.iter()
                        .take_while(|value| value.instance_id < before)
                        .cloned(),
                );
            }
        }

        if settled.is_empty() {
            Err(Error::not_found(from))
        } else {
            Ok(settled)
        }
    }

    /// Merges records learned from a peer while this node sits at `now`.
    ///
    /// Learned records are chosen, so from the first new one on they
    /// replace whatever the local acceptor had staged.
    pub fn maybe_append(&mut self, values: &[ChosenValue], now: InstanceId) -> Result<()> {
        let max = max_or_none(&*self.storage)?;
        let fresh = values
            .iter()
            .filter(|value| value.instance_id >= now)
            .filter(|value| max.map_or(true, |max| value.instance_id > max))
            .cloned()
            .collect::<Vec<_>>();

        let first = match fresh.first() {
        | Some(value) => value.instance_id,
        | None => return Ok(()),
        };

        self.unstable.truncate_from(first);
        self.unstable.append_all(&fresh)
    }

    /// Unstable chosen-prefix records below `before`, ready to be persisted.
    pub fn settled(&self, before: InstanceId) -> Vec<ChosenValue> {
        self.unstable
            .accepted_values()
            .iter()
            .take_while(|value| value.instance_id < before)
            .cloned()
            .collect()
    }

    /// Drops unstable records through `instance_id` once the host has
    /// persisted them.
    pub fn stable_to(&mut self, instance_id: InstanceId) {
        self.unstable.stable_to(instance_id);
    }
}

fn max_or_none<S: Storage>(storage: &S) -> Result<Option<InstanceId>> {
    match storage.max_instance_id() {
    | Ok(max) => Ok(Some(max)),
    | Err(error) if error.is_not_found() => Ok(None),
    | Err(error) => Err(error),
    }
}
