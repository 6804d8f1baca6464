//! # Summary
//!
//! Staging buffer for records that are not yet durable.
//!
//! The buffer holds a contiguous run that picks up right after storage's
//! `max`. The acceptor rewrites the last record as its state for the current
//! instance changes; learned batches extend it. Once the host has persisted a
//! prefix, `stable_to` drops it.

use crate::error::{Error, Result};
use crate::message::{ChosenValue, InstanceId};
use crate::storage;

#[derive(Clone, Debug, Default)]
pub struct Unstable {
    /// Instance id of `values[0]`, or where the next record is expected
    min: InstanceId,
    values: Vec<ChosenValue>,
}

impl Unstable {
    /// Empty buffer positioned right after `storage_max`.
    pub fn new(storage_max: Option<InstanceId>) -> Self {
        Unstable {
            min: storage_max.map_or(0, |max| max + 1),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    fn bounds(&self) -> Option<(InstanceId, InstanceId)> {
        if self.values.is_empty() {
            None
        } else {
            Some((self.min, self.min + self.values.len() as u64 - 1))
        }
    }

    pub fn min_instance_id(&self) -> Result<InstanceId> {
        self.bounds().map(|(min, _)| min).ok_or_else(|| Error::not_found(self.min))
    }

    pub fn max_instance_id(&self) -> Result<InstanceId> {
        self.bounds().map(|(_, max)| max).ok_or_else(|| Error::not_found(self.min))
    }

    /// Stages a single acceptor snapshot: replaces the last record when it
    /// belongs to the same instance, otherwise extends the run by one.
    pub fn append(&mut self, value: ChosenValue) -> Result<()> {
        let instance_id = value.instance_id;
        match self.bounds() {
        | None => {
            self.min = instance_id;
            self.values.push(value);
        }
        | Some((_, max)) if instance_id == max => {
            let last = self.values.len() - 1;
            self.values[last] = value;
        }
        | Some((_, max)) if instance_id == max + 1 => {
            self.values.push(value);
        }
        | Some((min, max)) => {
            return Err(Error::violation(format!(
                "unstable append of instance {} outside [{}, {}]",
                instance_id,
                min,
                max + 1,
            )));
        }
        }
        Ok(())
    }

    /// Merges a contiguous batch using the same rules as `Storage::append`.
    pub fn append_all(&mut self, values: &[ChosenValue]) -> Result<()> {
        let suffix = storage::extension(self.bounds(), values)?;
        if let Some(first) = suffix.first() {
            if self.values.is_empty() {
                self.min = first.instance_id;
            }
            self.values.extend_from_slice(suffix);
        }
        Ok(())
    }

    /// Staged record for `instance_id`.
    ///
    /// `Ok(None)` below the run (the caller should look in storage),
    /// `NotFound` past its end.
    pub fn get(&self, instance_id: InstanceId) -> Result<Option<&ChosenValue>> {
        match self.bounds() {
        | None => Ok(None),
        | Some((min, _)) if instance_id < min => Ok(None),
        | Some((_, max)) if instance_id > max => Err(Error::not_found(instance_id)),
        | Some((min, _)) => Ok(Some(&self.values[(instance_id - min) as usize])),
        }
    }

    /// Records in `[lo, hi)`; any bound outside the run is a violation.
    pub fn slice(&self, lo: InstanceId, hi: InstanceId) -> Result<&[ChosenValue]> {
        let upper = self.min + self.values.len() as u64;
        if lo > hi || lo < self.min || hi > upper {
            return Err(Error::violation(format!(
                "unstable slice [{}, {}) outside [{}, {})",
                lo, hi, self.min, upper,
            )));
        }
        Ok(&self.values[(lo - self.min) as usize..(hi - self.min) as usize])
    }

    /// Leading run of records that all carry an accepted value.
    pub fn accepted_values(&self) -> &[ChosenValue] {
        let end = self
            .values
            .iter()
            .position(|value| !value.has_value())
            .unwrap_or(self.values.len());
        &self.values[..end]
    }

    /// Chosen-prefix records from `from` on. Starting below the run yields
    /// the whole prefix; starting past its end is `NotFound`.
    pub fn accepted_values_from(&self, from: InstanceId) -> Result<&[ChosenValue]> {
        if self.values.is_empty() {
            return Ok(&[]);
        }
        if from >= self.min + self.values.len() as u64 {
            return Err(Error::not_found(from));
        }
        let prefix = self.accepted_values();
        let skip = from.saturating_sub(self.min) as usize;
        Ok(&prefix[skip.min(prefix.len())..])
    }

    /// Drops every record up to and including `instance_id`.
    pub fn stable_to(&mut self, instance_id: InstanceId) {
        if instance_id < self.min {
            return;
        }
        let stable = ((instance_id - self.min + 1) as usize).min(self.values.len());
        self.values.drain(..stable);
        self.min = instance_id + 1;
        trace!("[UNSTABLE]: stable to {}", instance_id);
    }

    /// Discards every record from `instance_id` on.
    pub fn truncate_from(&mut self, instance_id: InstanceId) {
        if instance_id < self.min {
            self.values.clear();
            self.min = instance_id;
            return;
        }
        let keep = ((instance_id - self.min) as usize).min(self.values.len());
        self.values.truncate(keep);
    }

    pub fn last(&self) -> Option<&ChosenValue> {
        self.values.last()
    }
}
