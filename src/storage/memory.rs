use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::message::{ChosenValue, InstanceId};
use crate::storage;

/// Contiguous run of records starting at `min`.
#[derive(Clone, Debug, Default)]
pub(crate) struct Records {
    min: InstanceId,
    values: Vec<ChosenValue>,
}

impl Records {
    pub fn bounds(&self) -> Option<(InstanceId, InstanceId)> {
        if self.values.is_empty() {
            None
        } else {
            Some((self.min, self.min + self.values.len() as u64 - 1))
        }
    }

    pub fn get(&self, instance_id: InstanceId) -> Result<ChosenValue> {
        match self.bounds() {
        | Some((min, max)) if instance_id >= min && instance_id <= max => {
            Ok(self.values[(instance_id - min) as usize].clone())
        }
        | _ => Err(Error::not_found(instance_id)),
        }
    }

    pub fn list(&self, from: InstanceId, to: InstanceId) -> Result<Vec<ChosenValue>> {
        storage::check_bounds(self.bounds(), from, to)?;
        let lo = (from - self.min) as usize;
        let hi = (to - self.min) as usize;
        Ok(self.values[lo..hi].to_vec())
    }

    pub fn list_from(&self, from: InstanceId) -> Result<Vec<ChosenValue>> {
        let (_, max) = self.bounds().ok_or_else(|| Error::not_found(from))?;
        self.list(from, max + 1)
    }

    pub fn min(&self) -> Result<InstanceId> {
        self.bounds().map(|(min, _)| min).ok_or_else(|| Error::not_found(0))
    }

    pub fn max(&self) -> Result<InstanceId> {
        self.bounds().map(|(_, max)| max).ok_or_else(|| Error::not_found(0))
    }

    /// Part of `batch` that `extend` would add.
    pub fn extension<'a>(&self, batch: &'a [ChosenValue]) -> Result<&'a [ChosenValue]> {
        storage::extension(self.bounds(), batch)
    }

    /// Appends an extension previously computed by `extension`.
    pub fn extend(&mut self, suffix: &[ChosenValue]) {
        if let Some(first) = suffix.first() {
            if self.values.is_empty() {
                self.min = first.instance_id;
            }
            self.values.extend_from_slice(suffix);
        }
    }
}

/// Volatile storage backend, mostly for tests and single-process clusters.
#[derive(Debug, Default)]
pub struct MemoryStorage(RwLock<Records>);

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl storage::Storage for MemoryStorage {
    fn get(&self, instance_id: InstanceId) -> Result<ChosenValue> {
        self.0.read().get(instance_id)
    }

    fn list_from(&self, from: InstanceId) -> Result<Vec<ChosenValue>> {
        self.0.read().list_from(from)
    }

    fn list(&self, from: InstanceId, to: InstanceId) -> Result<Vec<ChosenValue>> {
        self.0.read().list(from, to)
    }

    fn min_instance_id(&self) -> Result<InstanceId> {
        self.0.read().min()
    }

    fn max_instance_id(&self) -> Result<InstanceId> {
        self.0.read().max()
    }

    fn append(&self, values: &[ChosenValue]) -> Result<()> {
        let mut records = self.0.write();
        let suffix = records.extension(values)?;
        if !suffix.is_empty() {
            trace!("[STORAGE]: appending [{}, {}]", suffix[0].instance_id, suffix[suffix.len() - 1].instance_id);
        }
        records.extend(suffix);
        Ok(())
    }
}
