//! # Summary
//!
//! Durable storage backend. Records are kept in memory for reads and mirrored
//! to an append-only file of `bincode`-encoded `ChosenValue`s.
//!
//! On open the file is replayed from the start. A torn record at the tail
//! (from a crash mid-write) is cut off so later appends land on a clean
//! boundary.

use std::fs;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::Path;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::message::{ChosenValue, InstanceId};
use crate::storage;
use crate::storage::memory::Records;

pub struct FileStorage {
    records: RwLock<Records>,
    file: Mutex<fs::File>,
}

impl FileStorage {
    /// Opens (or creates) the log file at `path` and replays its contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        let mut records = Records::default();
        let mut offset = 0;
        {
            let mut reader = BufReader::new(&mut file);
            loop {
                let value: ChosenValue = match bincode::deserialize_from(&mut reader) {
                | Ok(value) => value,
                | Err(error) => match *error {
                    | bincode::ErrorKind::Io(ref cause) if cause.kind() == io::ErrorKind::UnexpectedEof => break,
                    | _ => return Err(error.into()),
                },
                };
                offset += bincode::serialized_size(&value)?;
                let suffix = records.extension(std::slice::from_ref(&value))?;
                records.extend(suffix);
            }
        }

        file.set_len(offset)?;
        file.seek(SeekFrom::Start(offset))?;

        debug!(
            "[STORAGE]: opened {} with {:?}",
            path.as_ref().display(),
            records.bounds(),
        );

        Ok(FileStorage {
            records: RwLock::new(records),
            file: Mutex::new(file),
        })
    }
}

impl storage::Storage for FileStorage {
    fn get(&self, instance_id: InstanceId) -> Result<ChosenValue> {
        self.records.read().get(instance_id)
    }

    fn list_from(&self, from: InstanceId) -> Result<Vec<ChosenValue>> {
        self.records.read().list_from(from)
    }

    fn list(&self, from: InstanceId, to: InstanceId) -> Result<Vec<ChosenValue>> {
        self.records.read().list(from, to)
    }

    fn min_instance_id(&self) -> Result<InstanceId> {
        self.records.read().min()
    }

    fn max_instance_id(&self) -> Result<InstanceId> {
        self.records.read().max()
    }

    fn append(&self, values: &[ChosenValue]) -> Result<()> {
        let mut records = self.records.write();
        let suffix = records.extension(values)?;
        if suffix.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock();
        for value in suffix {
            bincode::serialize_into(&mut *file, value)?;
        }
        file.sync_data()?;

        records.extend(suffix);
        Ok(())
    }
}
