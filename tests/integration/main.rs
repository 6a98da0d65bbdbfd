//! Integration tests.

use ndarray::{ArrayD, IxDyn};
use ndarray_pnetcdf::{
    Dataset, ErrorCode, Format, Group, Hints, MemoryStore, Options, Region, Schema, Store, StoreError, Transfer,
    VarId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

mod bput_vars;
mod get_varm;
mod put_vara;
mod requests;

/// Formats every scenario is run against.
pub const FORMATS: [Format; 3] = [Format::Data64, Format::Offset64, Format::Classic];

/// Enables `RUST_LOG` output for the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Values in `0..10`, reproducible from `seed`.
pub fn random_i32(shape: &[usize], seed: u64) -> ArrayD<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(0..10))
}

/// Creates one dataset per rank of a group of `size`, all sharing the data
/// of a single store.
pub fn create_group(size: usize, format: Format) -> (MemoryStore, Vec<Dataset<MemoryStore>>) {
    let store = MemoryStore::new();
    let ranks = (0..size)
        .map(|rank| {
            let options = Options::new().format(format).group(Group::new(rank, size));
            Dataset::create(store.clone(), options).unwrap()
        })
        .collect();
    (store, ranks)
}

/// Reopens the dataset held by `store` once per rank of a group of `size`.
pub fn open_group(store: &MemoryStore, size: usize, options: Options) -> Vec<Dataset<MemoryStore>> {
    (0..size)
        .map(|rank| Dataset::open(store.clone(), options.clone().group(Group::new(rank, size))).unwrap())
        .collect()
}

/// Closes every rank of a group.
pub fn close_group(ranks: Vec<Dataset<MemoryStore>>) {
    for ds in ranks {
        ds.close().unwrap();
    }
}

/// Wraps a store to count the calls made to it and to fail every transfer
/// touching chosen variables.
#[derive(Debug, Default)]
pub struct Recording<S> {
    pub inner: S,
    /// Calls to `transfer_all`.
    pub batches: usize,
    /// Size of each batch handed to `transfer_all`.
    pub batch_sizes: Vec<usize>,
    /// Single reads and writes, with whether they were collective.
    pub singles: Vec<bool>,
    failing_names: Vec<String>,
    failing: HashSet<VarId>,
}

impl<S: Store> Recording<S> {
    pub fn new(inner: S) -> Recording<S> {
        Recording {
            inner,
            batches: 0,
            batch_sizes: Vec::new(),
            singles: Vec::new(),
            failing_names: Vec::new(),
            failing: HashSet::new(),
        }
    }

    /// Makes every transfer of the variable `name` fail with `EWRITE` once
    /// it has been declared.
    pub fn fail(mut self, name: &str) -> Recording<S> {
        self.failing_names.push(name.to_owned());
        self
    }

    fn refuse(&self, var: VarId) -> Result<(), StoreError> {
        refuse(&self.failing, var)
    }
}

fn refuse(failing: &HashSet<VarId>, var: VarId) -> Result<(), StoreError> {
    if failing.contains(&var) {
        Err(StoreError::new(ErrorCode::EWRITE, format!("{} is failing", var)))
    } else {
        Ok(())
    }
}

impl<S: Store> Store for Recording<S> {
    fn create(&mut self, format: Format, group: Group, hints: &Hints) -> Result<(), StoreError> {
        self.inner.create(format, group, hints)
    }

    fn open(&mut self, group: Group, hints: &Hints) -> Result<Schema, StoreError> {
        self.inner.open(group, hints)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close()
    }

    fn enddef(&mut self, schema: &Schema) -> Result<(), StoreError> {
        self.failing
            .extend(self.failing_names.iter().filter_map(|name| schema.var_id(name)));
        self.inner.enddef(schema)
    }

    fn redef(&mut self) -> Result<(), StoreError> {
        self.inner.redef()
    }

    fn begin_independent(&mut self) -> Result<(), StoreError> {
        self.inner.begin_independent()
    }

    fn end_independent(&mut self) -> Result<(), StoreError> {
        self.inner.end_independent()
    }

    fn num_records(&self) -> Result<usize, StoreError> {
        self.inner.num_records()
    }

    fn read(&mut self, var: VarId, region: &Region, collective: bool) -> Result<Vec<u8>, StoreError> {
        self.singles.push(collective);
        self.refuse(var)?;
        self.inner.read(var, region, collective)
    }

    fn write(&mut self, var: VarId, region: &Region, bytes: &[u8], collective: bool) -> Result<(), StoreError> {
        self.singles.push(collective);
        self.refuse(var)?;
        self.inner.write(var, region, bytes, collective)
    }

    fn transfer_all(&mut self, batch: &mut [Transfer<'_>]) -> Vec<Result<(), StoreError>> {
        self.batches += 1;
        self.batch_sizes.push(batch.len());
        let failing = &self.failing;
        let inner = &mut self.inner;
        batch
            .iter_mut()
            .map(|t| {
                refuse(failing, t.var())?;
                t.apply(&mut *inner, true)
            })
            .collect()
    }
}
