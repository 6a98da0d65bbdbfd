//! Reading and writing variables.

use crate::dataset::{into_array, Dataset};
use crate::element::{Element, NcType};
use crate::error::{Error, Result};
use crate::request::{Direction, Entry, Payload, RequestId};
use crate::schema::{VarId, VariableInfo};
use crate::slice::{Selection, SliceDescriptor};
use crate::store::Store;
use ndarray::{Array, ArrayD, ArrayView, AsArray, Dimension};

/// How a write is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOp {
    /// Written before the call returns.
    Blocking,
    /// Posted as a request. The values are owned by the request.
    Nonblocking,
    /// Posted as a request. The values are copied into the attached buffer.
    Buffered,
}

/// How a read is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GetOp {
    Blocking,
    Nonblocking,
}

/// The result of [`Dataset::get_with`].
#[derive(Debug)]
pub enum Fetched<T> {
    /// The values of a blocking read.
    Ready(ArrayD<T>),
    /// A posted nonblocking read.
    Posted(RequestId),
}

impl<S: Store> Dataset<S> {
    /// A handle for reading and writing the named variable.
    pub fn variable(&mut self, name: &str) -> Result<Variable<'_, S>> {
        let id = self.var_id(name)?;
        Ok(Variable { dataset: self, id })
    }

    /// A handle for the variable with id `id`.
    pub fn variable_by_id(&mut self, id: VarId) -> Result<Variable<'_, S>> {
        self.var_info(id)?;
        Ok(Variable { dataset: self, id })
    }

    /// Writes `data` to the selected region of `var`.
    ///
    /// Returns the request id for nonblocking and buffered writes, and
    /// `None` for blocking ones.
    pub fn put_with<'a, T, D, Sel, V>(
        &mut self,
        var: VarId,
        selection: Sel,
        data: V,
        op: PutOp,
    ) -> Result<Option<RequestId>>
    where
        T: Element + 'a,
        D: Dimension,
        Sel: Into<Selection>,
        V: AsArray<'a, T, D>,
    {
        self.put_view(var, &selection.into(), data.into(), op)
    }

    /// Reads the selected region of `var`, or posts a read of it.
    pub fn get_with<T, Sel>(&mut self, var: VarId, selection: Sel, op: GetOp) -> Result<Fetched<T>>
    where
        T: Element,
        Sel: Into<Selection>,
    {
        let selection = selection.into();
        match op {
            GetOp::Blocking => self.get_array(var, &selection).map(Fetched::Ready),
            GetOp::Nonblocking => self.post_get::<T>(var, &selection).map(Fetched::Posted),
        }
    }

    fn check_type<T: Element>(&self, var: VarId) -> Result<&VariableInfo> {
        let info = self.var_info(var)?;
        if info.nc_type() != T::NC_TYPE {
            return Err(Error::TypeMismatch {
                expected: info.nc_type(),
                found: T::NC_TYPE,
            });
        }
        Ok(info)
    }

    fn put_view<T: Element, D: Dimension>(
        &mut self,
        var: VarId,
        selection: &Selection,
        data: ArrayView<'_, T, D>,
        op: PutOp,
    ) -> Result<Option<RequestId>> {
        self.writable()?;
        self.mode.require_data()?;
        self.check_type::<T>(var)?;
        if op == PutOp::Buffered && !self.buffer.is_attached() {
            return Err(Error::NoBufferAttached);
        }

        let shape = self.shape(var)?;
        let desc = selection.resolve_for_write(&shape, self.schema.is_record(var), data.shape())?;
        if desc.is_empty() {
            if desc.has_empty_extent() && data.len() > 0 {
                return Err(Error::ShapeMismatch {
                    expected: 0,
                    found: data.len(),
                });
            }
            log::trace!("empty write to {} ignored", var);
            return Ok(match op {
                PutOp::Blocking => None,
                PutOp::Nonblocking | PutOp::Buffered => Some(RequestId::NULL),
            });
        }
        let needed = desc.buffer_len()?;
        if data.len() < needed || (desc.imap().is_none() && data.len() != needed) {
            return Err(Error::ShapeMismatch {
                expected: needed,
                found: data.len(),
            });
        }

        let values = match data.as_slice() {
            Some(slice) => desc.gather(slice),
            None => desc.gather(&data.iter().copied().collect::<Vec<_>>()),
        };
        let bytes = T::to_external(&values);

        match op {
            PutOp::Blocking => {
                let collective = self.mode.is_collective();
                self.store.write(var, desc.region(), &bytes, collective)?;
                Ok(None)
            }
            PutOp::Nonblocking => {
                let entry = Entry::new(var, T::NC_TYPE, desc, Direction::Write, Payload::Owned(bytes));
                Ok(Some(self.requests.post(entry)))
            }
            PutOp::Buffered => {
                let reservation = self.buffer.stage(&bytes)?;
                let entry = Entry::new(
                    var,
                    T::NC_TYPE,
                    desc,
                    Direction::Write,
                    Payload::Staged(reservation),
                );
                Ok(Some(self.requests.post(entry)))
            }
        }
    }

    fn resolve_read<T: Element>(&self, var: VarId, selection: &Selection) -> Result<SliceDescriptor> {
        self.mode.require_data()?;
        self.check_type::<T>(var)?;
        let shape = self.shape(var)?;
        selection.resolve(&shape)
    }

    /// Reads the selected elements in selection order.
    fn read_values<T: Element>(&mut self, var: VarId, desc: &SliceDescriptor) -> Result<Vec<T>> {
        if desc.is_empty() {
            return Ok(Vec::new());
        }
        let collective = self.mode.is_collective();
        let bytes = self.store.read(var, desc.region(), collective)?;
        let values = T::from_external(&bytes)?;
        if values.len() != desc.len() {
            return Err(Error::ShapeMismatch {
                expected: desc.len(),
                found: values.len(),
            });
        }
        Ok(values)
    }

    fn get_array<T: Element>(&mut self, var: VarId, selection: &Selection) -> Result<ArrayD<T>> {
        let desc = self.resolve_read::<T>(var, selection)?;
        let shape = desc.buffer_shape()?;
        let values = self.read_values::<T>(var, &desc)?;
        into_array(&desc, shape, values)
    }

    fn get_slice<T: Element>(&mut self, var: VarId, selection: &Selection, out: &mut [T]) -> Result<()> {
        let desc = self.resolve_read::<T>(var, selection)?;
        let needed = desc.buffer_len()?;
        if out.len() < needed {
            return Err(Error::ShapeMismatch {
                expected: needed,
                found: out.len(),
            });
        }
        let values = self.read_values::<T>(var, &desc)?;
        desc.scatter(&values, out);
        Ok(())
    }

    fn post_get<T: Element>(&mut self, var: VarId, selection: &Selection) -> Result<RequestId> {
        let desc = self.resolve_read::<T>(var, selection)?;
        if desc.is_empty() {
            return Ok(RequestId::NULL);
        }
        let entry = Entry::new(var, T::NC_TYPE, desc, Direction::Read, Payload::Pending);
        Ok(self.requests.post(entry))
    }
}

/// A variable of a dataset in data mode.
///
/// Every method takes a selection: a [`Selection`], or an `ndarray` slice
/// made with [`s!`](ndarray::s).
///
/// # Example
///
/// ```
/// use ndarray::{array, s};
/// use ndarray_pnetcdf::{Dataset, MemoryStore, NcType, Options, Requests, Selection};
/// # fn main() -> Result<(), ndarray_pnetcdf::Error> {
///
/// let mut ds = Dataset::create(MemoryStore::new(), Options::new())?;
/// ds.def_dim("y", 4)?;
/// ds.def_dim("x", 6)?;
/// ds.def_var("v", NcType::Double, &["y", "x"])?;
/// ds.enddef()?;
///
/// let mut v = ds.variable("v")?;
/// v.put(s![1..3, 0..6;2], &array![[1., 2., 3.], [4., 5., 6.]])?;
/// let id = v.iget::<f64, _>(Selection::new().start([2, 0]).count([1, 3]).stride([1, 2]))?;
///
/// ds.wait_all(Requests::All)?;
/// assert_eq!(ds.take::<f64>(id)?, array![[4., 5., 6.]].into_dyn());
/// # Ok(())
/// # }
/// ```
pub struct Variable<'a, S: Store> {
    dataset: &'a mut Dataset<S>,
    id: VarId,
}

impl<'a, S: Store> Variable<'a, S> {
    /// The variable's id.
    pub fn id(&self) -> VarId {
        self.id
    }

    fn info(&self) -> Result<&VariableInfo> {
        self.dataset.var_info(self.id)
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        self.info().map_or("", VariableInfo::name)
    }

    /// The external type of the values.
    pub fn nc_type(&self) -> Option<NcType> {
        self.info().ok().map(VariableInfo::nc_type)
    }

    /// Current shape, with the unlimited axis at the current record count.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.dataset.shape(self.id)
    }

    /// Reads the selection.
    ///
    /// With an index map, the map must describe a dense permutation of the
    /// selection, and the array has the permuted shape. Use
    /// [`get_into`](Variable::get_into) for other maps.
    pub fn get<T: Element, Sel: Into<Selection>>(&mut self, selection: Sel) -> Result<ArrayD<T>> {
        self.dataset.get_array(self.id, &selection.into())
    }

    /// Reads the selection into `out`, laid out by the index map or in
    /// row-major order.
    pub fn get_into<T: Element, Sel: Into<Selection>>(&mut self, selection: Sel, out: &mut [T]) -> Result<()> {
        self.dataset.get_slice(self.id, &selection.into(), out)
    }

    /// Writes `data` to the selection.
    ///
    /// When the selection leaves `count` out, it is taken from the shape of
    /// `data`. This is how writes extend the unlimited dimension.
    pub fn put<'b, T, D, Sel, V>(&mut self, selection: Sel, data: V) -> Result<()>
    where
        T: Element + 'b,
        D: Dimension,
        Sel: Into<Selection>,
        V: AsArray<'b, T, D>,
    {
        self.dataset
            .put_view(self.id, &selection.into(), data.into(), PutOp::Blocking)
            .map(|_| ())
    }

    /// Posts a read of the selection. Take the values with
    /// [`Dataset::take`] after [`Dataset::wait_all`].
    ///
    /// An empty selection returns [`RequestId::NULL`] and has nothing to
    /// take.
    pub fn iget<T: Element, Sel: Into<Selection>>(&mut self, selection: Sel) -> Result<RequestId> {
        self.dataset.post_get::<T>(self.id, &selection.into())
    }

    /// Posts a write of `data`, which the request takes ownership of.
    pub fn iput<T, D, Sel>(&mut self, selection: Sel, data: Array<T, D>) -> Result<RequestId>
    where
        T: Element,
        D: Dimension,
        Sel: Into<Selection>,
    {
        self.dataset
            .put_view(self.id, &selection.into(), data.view(), PutOp::Nonblocking)
            .map(|id| id.unwrap_or(RequestId::NULL))
    }

    /// Posts a buffered write of `data`.
    ///
    /// The values are copied into the attached buffer before this returns,
    /// so `data` may be changed or dropped right away. Fails with
    /// [`Error::BufferExhausted`] when the buffer cannot hold them.
    pub fn bput<'b, T, D, Sel, V>(&mut self, selection: Sel, data: V) -> Result<RequestId>
    where
        T: Element + 'b,
        D: Dimension,
        Sel: Into<Selection>,
        V: AsArray<'b, T, D>,
    {
        self.dataset
            .put_view(self.id, &selection.into(), data.into(), PutOp::Buffered)
            .map(|id| id.unwrap_or(RequestId::NULL))
    }
}
