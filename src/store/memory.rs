use super::{Store, Transfer};
use crate::dataset::{Format, Group, Hints};
use crate::error::{ErrorCode, StoreError};
use crate::schema::{Schema, VarId};
use crate::slice::Region;
use parking_lot::Mutex;
use std::result;
use std::sync::Arc;

/// An in-process store keeping every variable in memory.
///
/// Clones share the same data, so several datasets opened on clones of one
/// `MemoryStore` behave like the ranks of a process group addressing one
/// file. Variables are held in external representation and zero-filled.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ndarray_pnetcdf::{Dataset, MemoryStore, NcType, Options, Selection};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
///
/// let store = MemoryStore::new();
/// let mut ds = Dataset::create(store.clone(), Options::new())?;
/// ds.def_dim("x", 3)?;
/// ds.def_var("v", NcType::Int, &["x"])?;
/// ds.enddef()?;
/// ds.variable("v")?.put(Selection::all(), &array![1, 2, 3])?;
/// ds.close()?;
///
/// let mut ds = Dataset::open(store, Options::new())?;
/// ds.enddef()?;
/// assert_eq!(ds.variable("v")?.get::<i32, _>(Selection::all())?, array![1, 2, 3].into_dyn());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    independent: bool,
}

#[derive(Debug, Default)]
struct Shared {
    schema: Option<Schema>,
    format: Option<Format>,
    /// Bytes of each variable, in the order of `schema.vars()`.
    data: Vec<Vec<u8>>,
    num_records: usize,
}

fn store_error(code: ErrorCode, message: String) -> StoreError {
    StoreError::new(code, message)
}

impl Shared {
    fn schema(&self) -> result::Result<&Schema, StoreError> {
        self.schema
            .as_ref()
            .ok_or_else(|| store_error(ErrorCode::EINDEFINE, "no schema has been committed".into()))
    }

    /// Shape and element size of `var`, and whether it is a record variable.
    fn layout(&self, var: VarId) -> result::Result<(Vec<usize>, usize, bool), StoreError> {
        let schema = self.schema()?;
        let info = schema
            .var(var)
            .ok_or_else(|| store_error(ErrorCode::ENOTVAR, format!("no variable {}", var)))?;
        let shape = schema
            .shape(var, self.num_records)
            .ok_or_else(|| store_error(ErrorCode::EBADDIM, format!("bad dimension in {}", var)))?;
        Ok((shape, info.nc_type().size(), schema.is_record(var)))
    }

    fn allocate(&mut self, schema: &Schema) {
        for index in self.data.len()..schema.vars().len() {
            let var = VarId(index);
            let records = if schema.is_record(var) {
                self.num_records
            } else {
                1
            };
            let len = schema.record_len(var).unwrap_or(0) * records;
            let size = schema.vars()[index].nc_type().size();
            self.data.push(vec![0; len * size]);
        }
    }

    fn grow(&mut self, num_records: usize) -> result::Result<(), StoreError> {
        if num_records <= self.num_records {
            return Ok(());
        }
        let schema = self.schema()?.clone();
        let too_large = || {
            store_error(
                ErrorCode::ENOMEM,
                format!("cannot grow to {} records", num_records),
            )
        };
        // Reserve everything first so a failure leaves every variable as it was.
        let mut sizes = Vec::with_capacity(self.data.len());
        for (index, bytes) in self.data.iter_mut().enumerate() {
            let var = VarId(index);
            if !schema.is_record(var) {
                sizes.push(None);
                continue;
            }
            let size = schema
                .record_len(var)
                .unwrap_or(0)
                .checked_mul(schema.vars()[index].nc_type().size())
                .and_then(|record_bytes| record_bytes.checked_mul(num_records))
                .ok_or_else(too_large)?;
            bytes
                .try_reserve_exact(size - bytes.len())
                .map_err(|_| too_large())?;
            sizes.push(Some(size));
        }
        for (bytes, size) in self.data.iter_mut().zip(sizes) {
            if let Some(size) = size {
                bytes.resize(size, 0);
            }
        }
        log::debug!("records grown from {} to {}", self.num_records, num_records);
        self.num_records = num_records;
        Ok(())
    }

    fn check(&self, var: VarId, region: &Region, shape: &[usize]) -> result::Result<(), StoreError> {
        if region.ndim() != shape.len() {
            return Err(store_error(
                ErrorCode::EINVAL,
                format!("region of {} has the wrong rank", var),
            ));
        }
        if region.is_empty() {
            return Ok(());
        }
        for (axis, &len) in shape.iter().enumerate() {
            if region.end(axis) > len {
                return Err(store_error(
                    ErrorCode::EEDGE,
                    format!("region of {} exceeds axis {}", var, axis),
                ));
            }
        }
        Ok(())
    }

    fn read(&self, var: VarId, region: &Region) -> result::Result<Vec<u8>, StoreError> {
        let (shape, size, _) = self.layout(var)?;
        self.check(var, region, &shape)?;
        let data = &self.data[var.0];
        if let Some(run) = region.contiguous(&shape) {
            return Ok(data[run.start * size..run.end * size].to_vec());
        }
        let mut out = Vec::with_capacity(region.len() * size);
        for offset in region.offsets(&shape) {
            out.extend_from_slice(&data[offset * size..(offset + 1) * size]);
        }
        Ok(out)
    }

    fn write(&mut self, var: VarId, region: &Region, bytes: &[u8]) -> result::Result<(), StoreError> {
        let (_, size, record) = self.layout(var)?;
        if bytes.len() != region.len() * size {
            return Err(store_error(
                ErrorCode::EIOMISMATCH,
                format!(
                    "{} bytes given for a region of {} bytes",
                    bytes.len(),
                    region.len() * size
                ),
            ));
        }
        if region.is_empty() {
            return Ok(());
        }
        if record && region.ndim() > 0 {
            self.grow(region.end(0))?;
        }
        let (shape, _, _) = self.layout(var)?;
        self.check(var, region, &shape)?;
        let data = &mut self.data[var.0];
        if let Some(run) = region.contiguous(&shape) {
            data[run.start * size..run.end * size].copy_from_slice(bytes);
            return Ok(());
        }
        for (offset, value) in region.offsets(&shape).zip(bytes.chunks_exact(size)) {
            data[offset * size..(offset + 1) * size].copy_from_slice(value);
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Returns `true` iff this handle is in independent data mode.
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    /// The committed declarations, if any.
    pub fn schema(&self) -> Option<Schema> {
        self.shared.lock().schema.clone()
    }
}

impl Store for MemoryStore {
    fn create(&mut self, format: Format, group: Group, _hints: &Hints) -> result::Result<(), StoreError> {
        let mut shared = self.shared.lock();
        match shared.format {
            Some(existing) if existing != format => Err(store_error(
                ErrorCode::EINVAL,
                format!("dataset already created as {}", existing),
            )),
            Some(_) => {
                log::debug!("rank {} joined existing dataset", group.rank());
                Ok(())
            }
            None => {
                shared.format = Some(format);
                log::debug!("rank {} created {} dataset", group.rank(), format);
                Ok(())
            }
        }
    }

    fn open(&mut self, _group: Group, _hints: &Hints) -> result::Result<Schema, StoreError> {
        let shared = self.shared.lock();
        match (&shared.schema, shared.format) {
            (Some(schema), _) => Ok(schema.clone()),
            (None, Some(format)) => Ok(Schema::new(format)),
            (None, None) => Err(store_error(ErrorCode::EFILE, "no dataset to open".into())),
        }
    }

    fn close(&mut self) -> result::Result<(), StoreError> {
        self.independent = false;
        Ok(())
    }

    fn enddef(&mut self, schema: &Schema) -> result::Result<(), StoreError> {
        let mut shared = self.shared.lock();
        match shared.schema {
            Some(ref current) if current == schema => return Ok(()),
            Some(ref current) if schema.extends(current) => {}
            Some(_) => {
                return Err(store_error(
                    ErrorCode::EINVAL,
                    "declarations differ from the committed ones".into(),
                ))
            }
            None => {}
        }
        shared.allocate(schema);
        shared.schema = Some(schema.clone());
        Ok(())
    }

    fn redef(&mut self) -> result::Result<(), StoreError> {
        Ok(())
    }

    fn begin_independent(&mut self) -> result::Result<(), StoreError> {
        self.independent = true;
        Ok(())
    }

    fn end_independent(&mut self) -> result::Result<(), StoreError> {
        self.independent = false;
        Ok(())
    }

    fn num_records(&self) -> result::Result<usize, StoreError> {
        Ok(self.shared.lock().num_records)
    }

    fn read(&mut self, var: VarId, region: &Region, _collective: bool) -> result::Result<Vec<u8>, StoreError> {
        self.shared.lock().read(var, region)
    }

    fn write(
        &mut self,
        var: VarId,
        region: &Region,
        bytes: &[u8],
        _collective: bool,
    ) -> result::Result<(), StoreError> {
        self.shared.lock().write(var, region, bytes)
    }

    fn transfer_all(&mut self, batch: &mut [Transfer<'_>]) -> Vec<result::Result<(), StoreError>> {
        let mut shared = self.shared.lock();
        batch
            .iter_mut()
            .map(|t| match t {
                Transfer::Read { var, region, out } => {
                    *out = shared.read(*var, &**region)?;
                    Ok(())
                }
                Transfer::Write { var, region, bytes } => shared.write(*var, &**region, *bytes),
            })
            .collect()
    }
}
