//! The storage and transport collaborator.
//!
//! A [`Store`] owns the physical file and the collective machinery behind
//! it. A [`Dataset`](crate::Dataset) validates every region, tracks requests
//! and buffers, and hands the store fully resolved transfers.
//!
//! Bytes crossing this boundary are in external representation (big-endian,
//! see [`Element`](crate::Element)) and in row-major order of the region.

use crate::dataset::{Format, Group, Hints};
use crate::error::StoreError;
use crate::schema::{Schema, VarId};
use crate::slice::Region;
use std::result;

mod memory;

pub use self::memory::MemoryStore;

/// One entry of a batched transfer.
#[derive(Debug)]
pub enum Transfer<'a> {
    /// Read `region` of `var` into `out`.
    Read {
        var: VarId,
        region: &'a Region,
        out: Vec<u8>,
    },
    /// Write `bytes` to `region` of `var`.
    Write {
        var: VarId,
        region: &'a Region,
        bytes: &'a [u8],
    },
}

impl<'a> Transfer<'a> {
    pub fn var(&self) -> VarId {
        match self {
            Transfer::Read { var, .. } | Transfer::Write { var, .. } => *var,
        }
    }

    pub fn region(&self) -> &Region {
        match self {
            Transfer::Read { region, .. } | Transfer::Write { region, .. } => region,
        }
    }

    /// Performs this transfer with a single call to `store`.
    pub fn apply<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        collective: bool,
    ) -> result::Result<(), StoreError> {
        match self {
            Transfer::Read { var, region, out } => {
                *out = store.read(*var, &**region, collective)?;
                Ok(())
            }
            Transfer::Write { var, region, bytes } => {
                store.write(*var, &**region, *bytes, collective)
            }
        }
    }

    /// Takes the bytes delivered to a read.
    pub(crate) fn into_output(self) -> Option<Vec<u8>> {
        match self {
            Transfer::Read { out, .. } => Some(out),
            Transfer::Write { .. } => None,
        }
    }
}

/// The operations a dataset needs from the file and process group.
///
/// Mode changes (`enddef`, `redef`, `begin_independent`,
/// `end_independent`) and collective transfers are collective: every process
/// in the group makes the same calls in the same order.
pub trait Store {
    /// Creates a new, empty dataset.
    fn create(&mut self, format: Format, group: Group, hints: &Hints) -> result::Result<(), StoreError>;

    /// Opens an existing dataset and returns its declarations.
    fn open(&mut self, group: Group, hints: &Hints) -> result::Result<Schema, StoreError>;

    fn close(&mut self) -> result::Result<(), StoreError>;

    /// Commits the declarations made in define mode.
    fn enddef(&mut self, schema: &Schema) -> result::Result<(), StoreError>;

    fn redef(&mut self) -> result::Result<(), StoreError>;

    fn begin_independent(&mut self) -> result::Result<(), StoreError>;

    fn end_independent(&mut self) -> result::Result<(), StoreError>;

    /// Current length of the unlimited dimension, agreed across the group.
    fn num_records(&self) -> result::Result<usize, StoreError>;

    /// Reads `region` of `var`.
    fn read(&mut self, var: VarId, region: &Region, collective: bool) -> result::Result<Vec<u8>, StoreError>;

    /// Writes `bytes` to `region` of `var`, growing the unlimited dimension
    /// if the region extends past it.
    fn write(
        &mut self,
        var: VarId,
        region: &Region,
        bytes: &[u8],
        collective: bool,
    ) -> result::Result<(), StoreError>;

    /// Performs a batch of transfers as one collective operation, in order,
    /// and reports the outcome of each.
    ///
    /// The default implementation calls [`Transfer::apply`] for each entry.
    fn transfer_all(&mut self, batch: &mut [Transfer<'_>]) -> Vec<result::Result<(), StoreError>> {
        batch.iter_mut().map(|t| t.apply(self, true)).collect()
    }
}

impl<S: Store + ?Sized> Store for &mut S {
    fn create(&mut self, format: Format, group: Group, hints: &Hints) -> result::Result<(), StoreError> {
        (**self).create(format, group, hints)
    }

    fn open(&mut self, group: Group, hints: &Hints) -> result::Result<Schema, StoreError> {
        (**self).open(group, hints)
    }

    fn close(&mut self) -> result::Result<(), StoreError> {
        (**self).close()
    }

    fn enddef(&mut self, schema: &Schema) -> result::Result<(), StoreError> {
        (**self).enddef(schema)
    }

    fn redef(&mut self) -> result::Result<(), StoreError> {
        (**self).redef()
    }

    fn begin_independent(&mut self) -> result::Result<(), StoreError> {
        (**self).begin_independent()
    }

    fn end_independent(&mut self) -> result::Result<(), StoreError> {
        (**self).end_independent()
    }

    fn num_records(&self) -> result::Result<usize, StoreError> {
        (**self).num_records()
    }

    fn read(&mut self, var: VarId, region: &Region, collective: bool) -> result::Result<Vec<u8>, StoreError> {
        (**self).read(var, region, collective)
    }

    fn write(
        &mut self,
        var: VarId,
        region: &Region,
        bytes: &[u8],
        collective: bool,
    ) -> result::Result<(), StoreError> {
        (**self).write(var, region, bytes, collective)
    }

    fn transfer_all(&mut self, batch: &mut [Transfer<'_>]) -> Vec<result::Result<(), StoreError>> {
        (**self).transfer_all(batch)
    }
}
