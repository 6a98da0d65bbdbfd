use crate::buffer::BufferAccountant;
use crate::element::{Element, NcType};
use crate::error::{CloseError, Error, ErrorCode, Result, StoreError};
use crate::mode::{Mode, Transition};
use crate::request::{Direction, Payload, RequestId, RequestState, RequestTracker, Requests};
use crate::schema::{DimId, Dimension, Schema, VarId, VariableInfo, UNLIMITED};
use crate::slice::SliceDescriptor;
use crate::store::{Store, Transfer};
use ndarray::{ArrayD, IxDyn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::result;

/// Implementation hints passed through to the store, like MPI info.
pub type Hints = BTreeMap<String, String>;

/// The on-disk format family of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// CDF-1, 32-bit offsets.
    Classic,
    /// CDF-2, 64-bit offsets.
    Offset64,
    /// CDF-5, 64-bit data. Adds the unsigned and 64-bit integer types.
    Data64,
}

impl Format {
    /// Returns `true` iff variables of type `nc_type` can be stored in this
    /// format.
    pub fn supports(self, nc_type: NcType) -> bool {
        match self {
            Format::Classic | Format::Offset64 => nc_type.is_classic(),
            Format::Data64 => true,
        }
    }
}

impl Default for Format {
    fn default() -> Format {
        Format::Classic
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Format::Classic => "CDF-1",
            Format::Offset64 => "CDF-2",
            Format::Data64 => "CDF-5",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// The calling process's place in its process group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Group {
    rank: usize,
    size: usize,
}

impl Group {
    /// The process `rank` of a group of `size`.
    ///
    /// # Panics
    ///
    /// Panics if `rank >= size`. See [`Group::try_new`] for a checked version.
    pub fn new(rank: usize, size: usize) -> Group {
        assert!(rank < size, "rank {} is outside a group of {}", rank, size);
        Group { rank, size }
    }

    /// Like [`Group::new`], but fails with [`Error::InvalidGroup`] if
    /// `rank >= size`.
    pub fn try_new(rank: usize, size: usize) -> Result<Group> {
        if rank >= size {
            return Err(Error::InvalidGroup { rank, size });
        }
        Ok(Group { rank, size })
    }

    /// This process's index within the group.
    pub fn rank(self) -> usize {
        self.rank
    }

    /// Number of processes in the group.
    pub fn size(self) -> usize {
        self.size
    }
}

impl Default for Group {
    fn default() -> Group {
        Group { rank: 0, size: 1 }
    }
}

/// Options for creating or opening a dataset.
///
/// # Example
///
/// ```
/// use ndarray_pnetcdf::{Format, Group, Options};
///
/// let options = Options::new()
///     .format(Format::Data64)
///     .group(Group::new(1, 4))
///     .hint("cb_buffer_size", "16777216");
/// # let _ = options;
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    format: Format,
    group: Group,
    hints: Hints,
    access: AccessMode,
}

impl Options {
    /// CDF-1, a single-process group, no hints, read-write.
    pub fn new() -> Options {
        Options {
            format: Format::default(),
            group: Group::default(),
            hints: Hints::new(),
            access: AccessMode::ReadWrite,
        }
    }

    /// Sets the format of a created dataset. Ignored when opening.
    pub fn format(mut self, format: Format) -> Options {
        self.format = format;
        self
    }

    pub fn group(mut self, group: Group) -> Options {
        self.group = group;
        self
    }

    pub fn hint<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Options {
        self.hints.insert(key.into(), value.into());
        self
    }

    /// Opens the dataset read-only.
    pub fn read_only(mut self) -> Options {
        self.access = AccessMode::ReadOnly;
        self
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}

/// An open dataset.
///
/// A dataset starts in define mode, where dimensions and variables are
/// declared. [`enddef`](Dataset::enddef) switches to data mode, where
/// variables are read and written through [`variable`](Dataset::variable).
///
/// Nonblocking requests posted with `iget`, `iput` and `bput` are performed
/// by [`wait_all`](Dataset::wait_all). A dataset is finished with
/// [`close`](Dataset::close), which refuses while requests are pending.
pub struct Dataset<S: Store> {
    pub(crate) store: S,
    pub(crate) schema: Schema,
    pub(crate) mode: Mode,
    pub(crate) buffer: BufferAccountant,
    pub(crate) requests: RequestTracker,
    group: Group,
    hints: Hints,
    access: AccessMode,
}

impl<S: Store> fmt::Debug for Dataset<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("format", &self.schema.format())
            .field("mode", &self.mode)
            .field("group", &self.group)
            .field("pending", &self.requests.pending())
            .finish_non_exhaustive()
    }
}

type Outcome = (result::Result<(), StoreError>, Option<Vec<u8>>);

impl<S: Store> Dataset<S> {
    /// Creates a new dataset in `store`.
    pub fn create(mut store: S, options: Options) -> Result<Dataset<S>> {
        if options.access == AccessMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        store.create(options.format, options.group, &options.hints)?;
        log::debug!(
            "rank {}/{} created {} dataset",
            options.group.rank(),
            options.group.size(),
            options.format
        );
        Ok(Dataset::new(store, Schema::new(options.format), options))
    }

    /// Opens the dataset held by `store`.
    pub fn open(mut store: S, options: Options) -> Result<Dataset<S>> {
        let schema = store.open(options.group, &options.hints)?;
        log::debug!(
            "rank {}/{} opened {} dataset with {} variables",
            options.group.rank(),
            options.group.size(),
            schema.format(),
            schema.vars().len()
        );
        Ok(Dataset::new(store, schema, options))
    }

    fn new(store: S, schema: Schema, options: Options) -> Dataset<S> {
        Dataset {
            store,
            schema,
            mode: Mode::initial(),
            buffer: BufferAccountant::new(),
            requests: RequestTracker::new(),
            group: options.group,
            hints: options.hints,
            access: options.access,
        }
    }

    /// Closes the dataset and returns the store.
    ///
    /// Fails with [`Error::PendingRequests`] while any nonblocking request
    /// is outstanding. The error hands the dataset back so the requests can
    /// be committed or cancelled first. An attached buffer is detached, and
    /// a dataset still in define mode commits its declarations.
    pub fn close(mut self) -> result::Result<S, CloseError<S>> {
        let outstanding = self.requests.pending() + self.requests.count(RequestState::Committed);
        if outstanding > 0 {
            return Err(CloseError::new(self, Error::PendingRequests(outstanding)));
        }
        if self.buffer.is_attached() {
            if let Err(err) = self.buffer.detach() {
                return Err(CloseError::new(self, err));
            }
        }
        if self.mode.is_define() {
            if let Err(err) = self.transition(Transition::EndDef) {
                return Err(CloseError::new(self, err));
            }
        }
        if let Err(err) = self.store.close() {
            return Err(CloseError::new(self, err.into()));
        }
        log::debug!("rank {} closed dataset", self.group.rank());
        Ok(self.store)
    }

    pub(crate) fn writable(&self) -> Result<()> {
        match self.access {
            AccessMode::ReadOnly => Err(Error::ReadOnly),
            AccessMode::ReadWrite => Ok(()),
        }
    }

    fn transition(&mut self, transition: Transition) -> Result<()> {
        let next = match self.mode.after(transition)? {
            Some(next) => next,
            None => {
                log::debug!("{} ignored, already in {} mode", transition, self.mode);
                return Ok(());
            }
        };
        match transition {
            Transition::EndDef => self.store.enddef(&self.schema)?,
            Transition::ReDef => self.store.redef()?,
            Transition::BeginIndep => self.store.begin_independent()?,
            Transition::EndIndep => self.store.end_independent()?,
        }
        log::debug!("{}: {} -> {}", transition, self.mode, next);
        self.mode = next;
        Ok(())
    }

    /// Declares a dimension. Use [`UNLIMITED`] as `len` for the record
    /// dimension.
    pub fn def_dim(&mut self, name: &str, len: usize) -> Result<DimId> {
        self.writable()?;
        self.mode.require_define()?;
        if self.schema.dim_id(name).is_some() {
            return Err(Error::NameInUse(name.to_owned()));
        }
        if len == UNLIMITED && self.schema.unlimited().is_some() {
            return Err(Error::UnlimitedInUse);
        }
        Ok(self.schema.push_dim(name, len))
    }

    /// Declares a variable over the named dimensions.
    pub fn def_var(&mut self, name: &str, nc_type: NcType, dims: &[&str]) -> Result<VarId> {
        self.writable()?;
        self.mode.require_define()?;
        if self.schema.var_id(name).is_some() {
            return Err(Error::NameInUse(name.to_owned()));
        }
        let format = self.schema.format();
        if !format.supports(nc_type) {
            return Err(Error::BadType { nc_type, format });
        }
        let mut ids = Vec::with_capacity(dims.len());
        for (axis, &dim) in dims.iter().enumerate() {
            let id = self
                .schema
                .dim_id(dim)
                .ok_or_else(|| Error::NoSuchDimension(dim.to_owned()))?;
            let unlimited = self.schema.dim(id).map_or(false, Dimension::is_unlimited);
            if unlimited && axis != 0 {
                return Err(Error::UnlimitedPosition(name.to_owned()));
            }
            ids.push(id);
        }
        let id = self.schema.push_var(name, nc_type, ids);
        log::debug!("defined {} {} {:?}", nc_type, name, dims);
        Ok(id)
    }

    /// Leaves define mode, committing the declarations to the store.
    pub fn enddef(&mut self) -> Result<()> {
        self.transition(Transition::EndDef)
    }

    /// Re-enters define mode to declare more dimensions and variables.
    pub fn redef(&mut self) -> Result<()> {
        self.writable()?;
        let pending = self.requests.pending();
        if pending > 0 {
            return Err(Error::PendingRequests(pending));
        }
        self.transition(Transition::ReDef)
    }

    /// Switches to independent data mode.
    pub fn begin_indep(&mut self) -> Result<()> {
        self.check_in_flight()?;
        self.transition(Transition::BeginIndep)
    }

    /// Switches back to collective data mode. Harmless when already
    /// collective.
    pub fn end_indep(&mut self) -> Result<()> {
        self.check_in_flight()?;
        self.transition(Transition::EndIndep)
    }

    fn check_in_flight(&self) -> Result<()> {
        match self.requests.count(RequestState::Committed) {
            0 => Ok(()),
            n => Err(Error::PendingRequests(n)),
        }
    }

    /// Attaches a buffer of `capacity` bytes for buffered writes
    /// ([`Variable::bput`](crate::Variable::bput)).
    pub fn attach_buff(&mut self, capacity: usize) -> Result<()> {
        self.writable()?;
        self.mode.require_data()?;
        let pending = self.requests.pending();
        if pending > 0 {
            return Err(Error::PendingRequests(pending));
        }
        self.buffer.attach(capacity)
    }

    /// Detaches the buffer. Fails while buffered writes are pending.
    pub fn detach_buff(&mut self) -> Result<()> {
        self.mode.require_data()?;
        self.buffer.detach()
    }

    /// Capacity in bytes of the attached buffer.
    pub fn get_buff_size(&self) -> Result<usize> {
        if !self.buffer.is_attached() {
            return Err(Error::NoBufferAttached);
        }
        Ok(self.buffer.capacity())
    }

    /// Bytes of the attached buffer held by pending buffered writes.
    pub fn get_buff_usage(&self) -> Result<usize> {
        if !self.buffer.is_attached() {
            return Err(Error::NoBufferAttached);
        }
        Ok(self.buffer.usage())
    }

    /// Performs the selected posted requests and reports the status of
    /// each.
    ///
    /// In collective mode the requests go to the store as one batch, in
    /// post order. In independent mode they are performed one at a time, in
    /// post order. A failed request does not stop the others.
    ///
    /// For [`Requests::Ids`] the statuses are in the order the ids were
    /// given, and [`RequestId::NULL`] reports [`ErrorCode::NOERR`]. Otherwise
    /// they are in post order. Selecting nothing does nothing.
    ///
    /// Completed reads keep their values until [`take`](Dataset::take).
    pub fn wait_all<R: Into<Requests>>(&mut self, requests: R) -> Result<Vec<(RequestId, ErrorCode)>> {
        self.mode.require_data()?;
        let requests = requests.into();
        let ids = self.requests.select(&requests)?;

        let mut codes = HashMap::with_capacity(ids.len());
        if !ids.is_empty() {
            for &id in &ids {
                self.requests.get_mut(id)?.state = RequestState::Committed;
            }
            let collective = self.mode.is_collective();
            log::debug!(
                "committing {} requests ({})",
                ids.len(),
                if collective { "collective" } else { "independent" }
            );
            let outcomes = self.commit(&ids, collective)?;
            for (&id, outcome) in ids.iter().zip(outcomes) {
                codes.insert(id, self.complete(id, outcome)?);
            }
        }

        let status = |id: &RequestId| (*id, codes.get(id).copied().unwrap_or_default());
        Ok(match requests {
            Requests::Ids(given) => given.iter().map(status).collect(),
            _ => ids.iter().map(status).collect(),
        })
    }

    /// Hands the committed requests `ids` to the store.
    fn commit(&mut self, ids: &[RequestId], collective: bool) -> Result<Vec<Outcome>> {
        let mut batch = Vec::with_capacity(ids.len());
        for &id in ids {
            let entry = self.requests.get(id)?;
            let (var, region) = (entry.var, entry.desc.region());
            batch.push(match entry.payload {
                Payload::Pending => Transfer::Read {
                    var,
                    region,
                    out: Vec::new(),
                },
                Payload::Owned(ref bytes) => Transfer::Write { var, region, bytes },
                Payload::Staged(ref reservation) => Transfer::Write {
                    var,
                    region,
                    bytes: self.buffer.bytes(reservation)?,
                },
                Payload::Received(_) => return Err(Error::RequestNotPending(id)),
            });
        }
        let mut results = if collective {
            self.store.transfer_all(&mut batch)
        } else {
            batch
                .iter_mut()
                .map(|t| t.apply(&mut self.store, false))
                .collect()
        };
        results.resize_with(batch.len(), || {
            Err(StoreError::new(ErrorCode::EIOMISMATCH, "store reported no status"))
        });
        Ok(results
            .into_iter()
            .zip(batch.into_iter().map(Transfer::into_output))
            .collect())
    }

    /// Records the outcome of a committed request and returns its status.
    fn complete(&mut self, id: RequestId, (result, output): Outcome) -> Result<ErrorCode> {
        let entry = self.requests.get(id)?;
        let expected = entry.desc.byte_size(entry.nc_type);
        let code = match (result, output) {
            (Err(err), _) => {
                log::warn!("request {} failed: {}", id, err);
                err.code()
            }
            (Ok(()), Some(bytes)) if bytes.len() != expected => {
                log::warn!(
                    "request {} read {} bytes, expected {}",
                    id,
                    bytes.len(),
                    expected
                );
                ErrorCode::EIOMISMATCH
            }
            (Ok(()), Some(bytes)) => {
                let entry = self.requests.get_mut(id)?;
                entry.payload = Payload::Received(bytes);
                entry.state = RequestState::Completed(ErrorCode::NOERR);
                return Ok(ErrorCode::NOERR);
            }
            (Ok(()), None) => ErrorCode::NOERR,
        };
        let entry = self.requests.remove(id)?;
        if let Payload::Staged(reservation) = entry.payload {
            self.buffer.release(reservation)?;
        }
        Ok(code)
    }

    /// Drops posted requests without performing them and returns their ids.
    ///
    /// Fails with [`Error::RequestNotPending`] if an explicit id names a
    /// request that has already been committed or completed.
    pub fn cancel<R: Into<Requests>>(&mut self, requests: R) -> Result<Vec<RequestId>> {
        let requests = requests.into();
        if let Requests::Ids(ref given) = requests {
            for &id in given.iter().filter(|id| !id.is_null()) {
                if self.requests.get(id)?.state != RequestState::Posted {
                    return Err(Error::RequestNotPending(id));
                }
            }
        }
        let ids = self.requests.select(&requests)?;
        for &id in &ids {
            let entry = self.requests.remove(id)?;
            if let Payload::Staged(reservation) = entry.payload {
                self.buffer.release(reservation)?;
            }
        }
        if !ids.is_empty() {
            log::debug!("cancelled {} requests", ids.len());
        }
        Ok(ids)
    }

    /// The state of a request.
    ///
    /// Writes are forgotten once [`wait_all`](Dataset::wait_all) has
    /// reported them, and reads once [`take`](Dataset::take) has returned
    /// their values. After that their ids are unknown.
    pub fn status(&self, id: RequestId) -> Result<RequestState> {
        self.requests.status(id)
    }

    /// Number of posted requests.
    pub fn pending(&self) -> usize {
        self.requests.pending()
    }

    /// Checks that `id` is a completed read of `T` values.
    fn received<T: Element>(&self, id: RequestId) -> Result<&SliceDescriptor> {
        let entry = self.requests.get(id)?;
        if entry.direction != Direction::Read {
            return Err(Error::UnknownRequest(id));
        }
        if T::NC_TYPE != entry.nc_type {
            return Err(Error::TypeMismatch {
                expected: entry.nc_type,
                found: T::NC_TYPE,
            });
        }
        match entry.state {
            RequestState::Completed(_) => Ok(&entry.desc),
            _ => Err(Error::PendingRequests(1)),
        }
    }

    fn take_values<T: Element>(&mut self, id: RequestId) -> Result<(SliceDescriptor, Vec<T>)> {
        let entry = self.requests.remove(id)?;
        let values = match entry.payload {
            Payload::Received(ref bytes) => T::from_external(bytes)?,
            _ => Vec::new(),
        };
        Ok((entry.desc, values))
    }

    /// Takes the values delivered to a completed nonblocking read.
    ///
    /// The array has the selection's shape, or the permuted shape described
    /// by its index map.
    pub fn take<T: Element>(&mut self, id: RequestId) -> Result<ArrayD<T>> {
        let shape = self.received::<T>(id)?.buffer_shape()?;
        let (desc, values) = self.take_values::<T>(id)?;
        into_array(&desc, shape, values)
    }

    /// Takes the values delivered to a completed nonblocking read into
    /// `out`, laid out by the selection's index map.
    pub fn take_into<T: Element>(&mut self, id: RequestId, out: &mut [T]) -> Result<()> {
        let needed = self.received::<T>(id)?.buffer_len()?;
        if out.len() < needed {
            return Err(Error::ShapeMismatch {
                expected: needed,
                found: out.len(),
            });
        }
        let (desc, values) = self.take_values::<T>(id)?;
        desc.scatter(&values, out);
        Ok(())
    }

    /// The file format chosen at creation.
    pub fn format(&self) -> Format {
        self.schema.format()
    }

    /// The current define/data and collective/independent mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// This process's place in the group sharing the dataset.
    pub fn group(&self) -> Group {
        self.group
    }

    /// Whether the dataset was opened read-only.
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// The hints passed to the store when the dataset was created or opened.
    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    /// The declared dimensions and variables.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dimensions(&self) -> &[Dimension] {
        self.schema.dims()
    }

    pub fn dimension(&self, name: &str) -> Result<&Dimension> {
        self.schema
            .dim_id(name)
            .and_then(|id| self.schema.dim(id))
            .ok_or_else(|| Error::NoSuchDimension(name.to_owned()))
    }

    pub fn variables(&self) -> &[VariableInfo] {
        self.schema.vars()
    }

    pub fn var_id(&self, name: &str) -> Result<VarId> {
        self.schema
            .var_id(name)
            .ok_or_else(|| Error::NoSuchVariable(name.to_owned()))
    }

    pub(crate) fn var_info(&self, var: VarId) -> Result<&VariableInfo> {
        self.schema
            .var(var)
            .ok_or_else(|| Error::NoSuchVariable(var.to_string()))
    }

    /// Current length of the unlimited dimension, or 0 if there is none.
    pub fn num_records(&self) -> Result<usize> {
        if self.schema.unlimited().is_none() {
            return Ok(0);
        }
        Ok(self.store.num_records()?)
    }

    /// Current shape of a variable.
    pub fn shape(&self, var: VarId) -> Result<Vec<usize>> {
        let records = if self.schema.is_record(var) {
            self.num_records()?
        } else {
            0
        };
        self.schema
            .shape(var, records)
            .ok_or_else(|| Error::NoSuchVariable(var.to_string()))
    }
}

/// Arranges `values`, in selection order, as an array of `shape`.
pub(crate) fn into_array<T: Element>(
    desc: &SliceDescriptor,
    shape: Vec<usize>,
    values: Vec<T>,
) -> Result<ArrayD<T>> {
    let out = if desc.imap().is_none() {
        values
    } else {
        let mut out = vec![T::zero(); desc.buffer_len()?];
        desc.scatter(&values, &mut out);
        out
    };
    let found = out.len();
    ArrayD::from_shape_vec(IxDyn(&shape), out).map_err(|_| Error::ShapeMismatch {
        expected: shape.iter().product(),
        found,
    })
}
