//! # Summary
//!
//! This module abstracts over stable storage. To recover from a crash, every
//! instance the cluster has chosen must survive on disk, along with the
//! acceptor state of the most recent one.
//!
//! Storage holds a contiguous, gap-free run of records `[min, max]`. Anything
//! present in storage is treated as chosen. Records that are not yet durable
//! live in the `Unstable` buffer, and `Log` stitches the two together.

use crate::error::{Error, Result};
use crate::message::{ChosenValue, InstanceId};

mod file;
mod memory;

pub mod log;
pub mod unstable;

pub use self::file::FileStorage;
pub use self::log::Log;
pub use self::memory::MemoryStorage;
pub use self::unstable::Unstable;

/// Durable record store shared between the driver and the host.
///
/// Implementations must be internally synchronized: the host appends while
/// the driver task reads.
pub trait Storage: Send + Sync + 'static {
    /// Record for `instance_id`, or `NotFound` outside `[min, max]`.
    fn get(&self, instance_id: InstanceId) -> Result<ChosenValue>;

    /// Every record from `from` through `max`.
    fn list_from(&self, from: InstanceId) -> Result<Vec<ChosenValue>>;

    /// Records in `[from, to)`.
    ///
    /// `NotFound` if the store is empty, `from` lies outside `[min, max]`,
    /// `to > max + 1`, or `from > to`.
    fn list(&self, from: InstanceId, to: InstanceId) -> Result<Vec<ChosenValue>>;

    fn min_instance_id(&self) -> Result<InstanceId>;

    fn max_instance_id(&self) -> Result<InstanceId>;

    /// Extends the store with a contiguous batch.
    ///
    /// Parts of the batch already covered are skipped. A batch that would
    /// leave a gap after `max` is a `ProtocolViolation`.
    fn append(&self, values: &[ChosenValue]) -> Result<()>;
}

/// Portion of a contiguous `batch` that extends a run spanning `bounds`.
///
/// With no existing run the whole batch is taken. Records at or below the
/// run's `max` are dropped; a batch starting past `max + 1` would open a gap.
pub(crate) fn extension<'a>(
    bounds: Option<(InstanceId, InstanceId)>,
    batch: &'a [ChosenValue],
) -> Result<&'a [ChosenValue]> {
    let (first, last) = match (batch.first(), batch.last()) {
    | (Some(first), Some(last)) => (first.instance_id, last.instance_id),
    | _ => return Ok(&[]),
    };

    if last < first || (last - first) as usize + 1 != batch.len() {
        return Err(Error::violation(format!(
            "batch [{}, {}] of {} records is not contiguous",
            first,
            last,
            batch.len(),
        )));
    }

    let max = match bounds {
    | None => return Ok(batch),
    | Some((_, max)) => max,
    };

    if last <= max {
        return Ok(&[]);
    }

    if first > max + 1 {
        return Err(Error::violation(format!(
            "append starting at {} leaves a gap after {}",
            first, max,
        )));
    }

    let skip = (max + 1 - first) as usize;
    Ok(&batch[skip..])
}

/// Checks `[from, to)` against a run spanning `bounds`.
pub(crate) fn check_bounds(
    bounds: Option<(InstanceId, InstanceId)>,
    from: InstanceId,
    to: InstanceId,
) -> Result<()> {
    match bounds {
    | Some((min, max)) if from >= min && from <= max && to <= max + 1 && from <= to => Ok(()),
    | _ => Err(Error::not_found(from)),
    }
}
